use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bizpass_types::Clock;

use crate::{IntentRequest, PaymentIntent, PaymentProvider, ProviderError};

/// Provider for test deployments. Nothing leaves the process.
///
/// Ids look like `mock_<unix>_<seq>` with an 8-digit hex sequence. The
/// sequence starts at a random offset unless built with [`Self::deterministic`].
pub struct MockPaymentProvider {
    clock: Arc<dyn Clock>,
    sequence: AtomicU32,
}

impl MockPaymentProvider {
    pub const NAME: &'static str = "mock";

    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sequence: AtomicU32::new(rand::random::<u32>()),
        }
    }

    /// Sequence starts at zero, so ids depend only on the clock and call order.
    #[must_use]
    pub fn deterministic(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sequence: AtomicU32::new(0),
        }
    }
}

impl PaymentProvider for MockPaymentProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, ProviderError> {
        request.validate()?;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let external_payment_id = format!("mock_{}_{seq:08x}", self.clock.now().timestamp());
        Ok(PaymentIntent {
            provider: Self::NAME,
            place_id: request.place_id,
            tier: request.tier,
            amount: request.amount,
            external_payment_id,
            source: request.source,
            invoice_payload: None,
        })
    }
}
