use std::sync::Arc;

use bizpass_types::{Clock, InvoicePayload};

use crate::{IntentRequest, PaymentIntent, PaymentProvider, ProviderError};

/// Telegram Stars invoices.
///
/// The invoice itself is sent by the bot layer; this adapter only allocates
/// the external id and encodes the payload Telegram echoes back on
/// pre-checkout and successful payment.
pub struct TelegramStarsProvider {
    clock: Arc<dyn Clock>,
}

impl TelegramStarsProvider {
    pub const NAME: &'static str = "telegram_stars";

    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl PaymentProvider for TelegramStarsProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, ProviderError> {
        request.validate()?;
        let external_payment_id = format!(
            "tg_{}_{:08x}",
            self.clock.now().timestamp(),
            rand::random::<u32>()
        );
        let payload = InvoicePayload {
            place_id: request.place_id,
            tier: request.tier,
            external_payment_id: external_payment_id.clone(),
            tg_user_id: request.tg_user_id,
            source: request.source,
        };
        Ok(PaymentIntent {
            provider: Self::NAME,
            place_id: request.place_id,
            tier: request.tier,
            amount: request.amount,
            external_payment_id,
            source: request.source,
            invoice_payload: Some(payload.encode()),
        })
    }
}
