//! Error taxonomy of the service façade.
//!
//! [`ValidationError`] and [`ServiceError::AccessDenied`] are caller-recoverable
//! and carry a message fit for the user. Store and provider failures are fatal
//! for the single request that hit them.

use std::borrow::Cow;
use std::fmt;

use bizpass_payments::ProviderError;
use bizpass_store::{StoreError, Transient};
use bizpass_types::{OwnerRequestId, PaymentEventId, PlaceId};
use thiserror::Error;

/// Stable machine-readable reason for a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    InvalidState,
    InvalidInput,
    PartnerSlotTaken,
    PendingRequestExists,
    AlreadyOwner,
    TokenMissing,
    TokenNotFound,
    TokenInactive,
    TokenExpired,
    TokenExhausted,
    TokenGeneration,
    UnknownTier,
    NotPaidTier,
    FreeDowngradeBlocked,
    PayloadInvalid,
    IntentMismatch,
    NotRefundable,
}

impl ValidationCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ValidationCode::InvalidState => "invalid_state",
            ValidationCode::InvalidInput => "invalid_input",
            ValidationCode::PartnerSlotTaken => "partner_slot_taken",
            ValidationCode::PendingRequestExists => "pending_request_exists",
            ValidationCode::AlreadyOwner => "already_owner",
            ValidationCode::TokenMissing => "token_missing",
            ValidationCode::TokenNotFound => "token_not_found",
            ValidationCode::TokenInactive => "token_inactive",
            ValidationCode::TokenExpired => "token_expired",
            ValidationCode::TokenExhausted => "token_exhausted",
            ValidationCode::TokenGeneration => "token_generation_failed",
            ValidationCode::UnknownTier => "unknown_tier",
            ValidationCode::NotPaidTier => "not_paid_tier",
            ValidationCode::FreeDowngradeBlocked => "free_downgrade_blocked",
            ValidationCode::PayloadInvalid => "payload_invalid",
            ValidationCode::IntentMismatch => "intent_mismatch",
            ValidationCode::NotRefundable => "not_refundable",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business-rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code})")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: Cow<'static, str>,
}

impl ValidationError {
    pub fn new(code: ValidationCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn partner_slot_taken() -> Self {
        Self::new(
            ValidationCode::PartnerSlotTaken,
            "This category already has an active partner.",
        )
    }

    #[must_use]
    pub fn already_processed() -> Self {
        Self::new(
            ValidationCode::InvalidState,
            "This request has already been processed.",
        )
    }
}

/// Entity looked up by id that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Place(PlaceId),
    OwnerRequest(OwnerRequestId),
    PaymentEvent(PaymentEventId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Place(id) => write!(f, "place {id}"),
            Missing::OwnerRequest(id) => write!(f, "owner request {id}"),
            Missing::PaymentEvent(id) => write!(f, "payment event {id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("access denied: {0}")]
    AccessDenied(&'static str),
    #[error("{0} not found")]
    NotFound(Missing),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ServiceError {
    pub fn validation(code: ValidationCode, message: impl Into<Cow<'static, str>>) -> Self {
        ServiceError::Validation(ValidationError::new(code, message))
    }

    /// Code of the wrapped validation error, if any.
    #[must_use]
    pub fn validation_code(&self) -> Option<ValidationCode> {
        match self {
            ServiceError::Validation(err) => Some(err.code),
            _ => None,
        }
    }

    /// Whether the message can be shown to the caller as-is.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_) | ServiceError::AccessDenied(_) | ServiceError::NotFound(_)
        )
    }
}

impl Transient for ServiceError {
    fn is_transient(&self) -> bool {
        match self {
            ServiceError::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
