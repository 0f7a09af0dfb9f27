//! Payment provider adapters.
//!
//! A provider turns a billing intent into a provider-specific payment handle.
//! Providers hold no state of their own and never touch the database; the
//! ledger records whatever they return after the call completes.
//!
//! - [`MockPaymentProvider`] - non-production provider with predictable ids
//! - [`TelegramStarsProvider`] - Stars invoices carrying an opaque [`InvoicePayload`]
//!
//! The concrete provider is chosen once at startup with [`provider_from_config`].

mod mock;
mod telegram_stars;

use std::sync::Arc;

use bizpass_config::ProviderKind;
use bizpass_types::{Clock, InvoicePayload, PaymentSource, PlaceId, TgUserId, Tier};
use thiserror::Error;

pub use mock::MockPaymentProvider;
pub use telegram_stars::TelegramStarsProvider;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("tier {0} cannot be purchased")]
    UnpaidTier(Tier),
    #[error("invalid amount {0}")]
    InvalidAmount(i64),
}

/// What the caller wants to buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentRequest {
    pub tg_user_id: TgUserId,
    pub place_id: PlaceId,
    pub tier: Tier,
    /// Price in the currency's minor units (whole Stars for `XTR`).
    pub amount: i64,
    pub source: PaymentSource,
}

impl IntentRequest {
    fn validate(&self) -> Result<(), ProviderError> {
        if !self.tier.is_paid() {
            return Err(ProviderError::UnpaidTier(self.tier));
        }
        if self.amount <= 0 {
            return Err(ProviderError::InvalidAmount(self.amount));
        }
        Ok(())
    }
}

/// Provider handle for one purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub provider: &'static str,
    pub place_id: PlaceId,
    pub tier: Tier,
    pub amount: i64,
    pub external_payment_id: String,
    pub source: PaymentSource,
    /// Opaque string echoed back by the provider on checkout, if it supports one.
    pub invoice_payload: Option<String>,
}

impl PaymentIntent {
    /// Decoded form of [`Self::invoice_payload`].
    #[must_use]
    pub fn payload(&self) -> Option<InvoicePayload> {
        self.invoice_payload.as_deref().and_then(InvoicePayload::decode)
    }
}

pub trait PaymentProvider: Send + Sync {
    /// Stable name stored in the ledger's `provider` column.
    fn name(&self) -> &'static str;

    fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, ProviderError>;
}

/// Build the provider selected in configuration.
#[must_use]
pub fn provider_from_config(kind: ProviderKind, clock: Arc<dyn Clock>) -> Arc<dyn PaymentProvider> {
    tracing::info!(provider = kind.as_str(), "Payment provider selected");
    match kind {
        ProviderKind::Mock => Arc::new(MockPaymentProvider::new(clock)),
        ProviderKind::TelegramStars => Arc::new(TelegramStarsProvider::new(clock)),
    }
}
