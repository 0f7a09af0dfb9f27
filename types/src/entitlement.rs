//! Read-only projection of what a place is allowed to show and edit.

use serde::Serialize;

use crate::{Subscription, SubscriptionStatus, Tier, Timestamp};

/// Derived entitlement for one place at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    /// Tier whose features are unlocked right now.
    pub effective_tier: Tier,
    /// Verified badge, mirrored onto the place row.
    pub verified: bool,
    /// Paid access ends at this instant, if any.
    pub paid_until: Option<Timestamp>,
    /// Auto-renewal was switched off but access continues until `paid_until`.
    pub renewal_canceled: bool,
}

impl Entitlement {
    pub const NONE: Entitlement = Entitlement {
        effective_tier: Tier::Free,
        verified: false,
        paid_until: None,
        renewal_canceled: false,
    };

    #[must_use]
    pub fn project(subscription: &Subscription, now: Timestamp) -> Self {
        if !subscription.tier.is_paid() || subscription.is_expired_at(now) {
            return Self::NONE;
        }
        match subscription.status {
            SubscriptionStatus::Active => Self {
                effective_tier: subscription.tier,
                verified: true,
                paid_until: subscription.expires_at,
                renewal_canceled: false,
            },
            SubscriptionStatus::Canceled => Self {
                effective_tier: subscription.tier,
                verified: false,
                paid_until: subscription.expires_at,
                renewal_canceled: true,
            },
            SubscriptionStatus::Inactive | SubscriptionStatus::PastDue => Self::NONE,
        }
    }

    #[must_use]
    pub fn allows(&self, required: Tier) -> bool {
        self.effective_tier.rank() >= required.rank()
    }

    #[must_use]
    pub fn has_paid_access(&self) -> bool {
        self.effective_tier.is_paid()
    }
}
