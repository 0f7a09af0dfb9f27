//! Shared plan matrix for business subscriptions.

use crate::Tier;

/// Currency code for Telegram Stars.
pub const STARS_CURRENCY: &str = "XTR";

/// Monthly price in minor units (Telegram Stars). `None` for `Free`.
#[must_use]
pub const fn monthly_price(tier: Tier) -> Option<i64> {
    match tier {
        Tier::Free => None,
        Tier::Light => Some(1000),
        Tier::Pro => Some(2500),
        Tier::Partner => Some(5000),
    }
}

/// Display title. The stored value stays `pro`; the UI shows "Premium".
#[must_use]
pub const fn plan_title(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "Free",
        Tier::Light => "Light",
        Tier::Pro => "Premium",
        Tier::Partner => "Partner",
    }
}
