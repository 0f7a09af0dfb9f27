//! Enum-backed tiers and statuses.
//!
//! Every value round-trips through the exact lowercase text stored in SQLite,
//! so an unknown string read back from the database is a parse error rather
//! than a silently accepted state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Subscription level. `Pro` is stored as `pro` and shown as "Premium".
    Tier as "tier" {
        Free => "free",
        Light => "light",
        Pro => "pro",
        Partner => "partner",
    }
}

impl Tier {
    pub const PAID: [Tier; 3] = [Tier::Light, Tier::Pro, Tier::Partner];

    #[must_use]
    pub const fn is_paid(self) -> bool {
        !matches!(self, Tier::Free)
    }

    /// Parse user input: trimmed, case-insensitive, accepts the "premium" alias.
    pub fn parse_loose(raw: &str) -> Result<Self, ParseEnumError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized == "premium" {
            return Ok(Tier::Pro);
        }
        normalized.parse()
    }

    /// Rank used for upgrade/downgrade comparisons.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Light => 1,
            Tier::Pro => 2,
            Tier::Partner => 3,
        }
    }
}

text_enum! {
    SubscriptionStatus as "subscription status" {
        Inactive => "inactive",
        Active => "active",
        PastDue => "past_due",
        /// Auto-renewal switched off; access is kept until `expires_at`.
        Canceled => "canceled",
    }
}

text_enum! {
    /// Ownership request state. `Approved` and `Rejected` are terminal.
    OwnerStatus as "owner status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

impl OwnerStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, OwnerStatus::Pending)
    }
}

text_enum! {
    ClaimTokenStatus as "claim token status" {
        Active => "active",
        Used => "used",
        Revoked => "revoked",
    }
}

text_enum! {
    PaymentEventType as "payment event type" {
        InvoiceCreated => "invoice_created",
        PreCheckoutOk => "pre_checkout_ok",
        PaymentSucceeded => "payment_succeeded",
        PaymentCanceled => "payment_canceled",
        PaymentFailed => "payment_failed",
        Refund => "refund",
    }
}

impl PaymentEventType {
    /// Map a provider terminal-event label onto a ledger event type.
    ///
    /// Only non-success terminal kinds are accepted here; success goes through
    /// the dedicated successful-payment path.
    #[must_use]
    pub fn from_terminal_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "cancel" | "canceled" | "cancelled" => Some(PaymentEventType::PaymentCanceled),
            "fail" | "failed" => Some(PaymentEventType::PaymentFailed),
            "refund" | "refunded" => Some(PaymentEventType::Refund),
            _ => None,
        }
    }
}

text_enum! {
    /// UI surface that originated a payment intent.
    PaymentSource as "payment source" {
        Card => "card",
        Plans => "plans",
    }
}

impl PaymentSource {
    /// One-character code used inside the opaque invoice payload.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            PaymentSource::Card => 'c',
            PaymentSource::Plans => 'p',
        }
    }

    /// Unknown codes fall back to `Card`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "p" => PaymentSource::Plans,
            _ => PaymentSource::Card,
        }
    }
}

text_enum! {
    /// Tag of an append-only audit log row.
    AuditAction as "audit action" {
        OwnerRequestCreated => "owner_request_created",
        OwnerClaimRequested => "owner_claim_requested",
        OwnerRequestApproved => "owner_request_approved",
        OwnerRequestRejected => "owner_request_rejected",
        PlaceProfileUpdated => "place_profile_updated",
        ClaimTokenCreated => "claim_token_created",
        ClaimTokenRotated => "claim_token_rotated",
        ClaimTokenRotatedBulk => "claim_token_rotated_admin_ui_bulk",
        AdminSubscriptionSet => "admin_subscription_set",
        SubscriptionTierChanged => "subscription_tier_changed",
        SubscriptionCanceled => "subscription_canceled",
        SubscriptionExpiredPastDue => "subscription_expired_past_due",
        SubscriptionPastDueToFree => "subscription_past_due_to_free",
        SubscriptionCanceledToFree => "subscription_canceled_to_free",
        InvoiceCreated => "invoice_created",
        PreCheckoutOk => "pre_checkout_ok",
        PaymentSucceeded => "payment_succeeded",
        PaymentCanceled => "payment_canceled",
        PaymentFailed => "payment_failed",
        Refund => "refund",
        AdminPaymentRefund => "admin_payment_refund",
    }
}

impl From<PaymentEventType> for AuditAction {
    fn from(event: PaymentEventType) -> Self {
        match event {
            PaymentEventType::InvoiceCreated => AuditAction::InvoiceCreated,
            PaymentEventType::PreCheckoutOk => AuditAction::PreCheckoutOk,
            PaymentEventType::PaymentSucceeded => AuditAction::PaymentSucceeded,
            PaymentEventType::PaymentCanceled => AuditAction::PaymentCanceled,
            PaymentEventType::PaymentFailed => AuditAction::PaymentFailed,
            PaymentEventType::Refund => AuditAction::Refund,
        }
    }
}

text_enum! {
    /// Owner-editable profile field of a place.
    PlaceField as "place field" {
        Name => "name",
        Description => "description",
        Address => "address",
    }
}

impl PlaceField {
    /// Maximum accepted length in characters.
    #[must_use]
    pub const fn max_len(self) -> usize {
        match self {
            PlaceField::Name => 120,
            PlaceField::Description => 1200,
            PlaceField::Address => 300,
        }
    }

    #[must_use]
    pub const fn required(self) -> bool {
        matches!(self, PlaceField::Name)
    }
}
