//! Entitlement and payment lifecycle engine for bizpass.
//!
//! [`BusinessService`] is the single entry point. Owner actions, admin
//! commands, payment provider callbacks and the periodic reconciliation sweep
//! all go through it, and each mutating call commits as exactly one unit of
//! work on the shared [`bizpass_store::Store`].
//!
//! - `moderation` - business registration and the owner request lifecycle
//! - `profile` - owner edits of listing fields
//! - `claim_tokens` - single-use tokens that bind an owner to an existing place
//! - `subscriptions` - tier changes and the verification mirror
//! - `ledger` - idempotent payment events and their effects
//! - `reconcile` - expiry sweep and its background loop

mod auth;
mod claim_tokens;
mod errors;
mod ledger;
mod moderation;
mod notify;
mod profile;
mod reconcile;
mod service;
mod subscriptions;

#[cfg(test)]
mod testing;

pub use auth::{AccessPolicy, AdminCapability};
pub use claim_tokens::{BulkRotation, IssuedToken};
pub use errors::{Missing, ServiceError, ServiceResult, ValidationCode, ValidationError};
pub use ledger::{LedgerEvent, MockResult, PaymentOutcome};
pub use moderation::{NewBusiness, Registration};
pub use notify::{AdminEvent, AdminNotifier, NoopNotifier, TracingNotifier};
pub use reconcile::{SweepStats, run_reconcile_loop};
pub use service::{BusinessService, ServiceSettings};
