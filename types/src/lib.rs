//! Core domain types for bizpass.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer: the store maps rows onto these
//! records, the service layer makes decisions with them, and UI collaborators
//! read the [`Entitlement`] projection.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod entitlement;
mod ids;
mod payload;
mod plan;
mod records;
mod status;
mod time;

pub use entitlement::Entitlement;
pub use ids::{
    AuditEntryId, CategoryId, ClaimTokenId, OwnerRequestId, PaymentEventId, PlaceId, TgUserId,
};
pub use payload::{InvoicePayload, PAYLOAD_PREFIX};
pub use plan::{STARS_CURRENCY, monthly_price, plan_title};
pub use records::{
    AuditEntry, ClaimToken, OwnerRequest, PaymentEvent, Place, Subscription, UserBusiness,
    mask_token,
};
pub use status::{
    AuditAction, ClaimTokenStatus, OwnerStatus, ParseEnumError, PaymentEventType, PaymentSource,
    PlaceField, SubscriptionStatus, Tier,
};
pub use time::{
    Clock, FixedClock, SUBSCRIPTION_PERIOD_DAYS, SystemClock, Timestamp, format_timestamp,
    parse_timestamp, period_end,
};
