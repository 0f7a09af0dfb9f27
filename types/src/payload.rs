//! Opaque invoice payload carried through the payment provider.
//!
//! Format: `bpayv1:<place_id>:<tier>:<external_payment_id>:<tg_user_id>:<source_code>`.
//! The provider echoes the string back on pre-checkout and on the successful
//! payment update, which lets the ledger recover the intent without a DB
//! round-trip.

use std::fmt;

use crate::{PaymentSource, PlaceId, TgUserId, Tier};

pub const PAYLOAD_PREFIX: &str = "bpayv1";

const FIELD_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicePayload {
    pub place_id: PlaceId,
    pub tier: Tier,
    pub external_payment_id: String,
    pub tg_user_id: TgUserId,
    pub source: PaymentSource,
}

impl InvoicePayload {
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a raw payload.
    ///
    /// Returns `None` for a wrong field count, an unknown version tag,
    /// non-positive ids, an unknown tier or an empty external id.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        if parts.len() != FIELD_COUNT || parts[0] != PAYLOAD_PREFIX {
            return None;
        }

        let place_id: i64 = parts[1].trim().parse().ok()?;
        let tg_user_id: i64 = parts[4].trim().parse().ok()?;
        if place_id <= 0 || tg_user_id <= 0 {
            return None;
        }

        let tier = Tier::parse_loose(parts[2]).ok()?;
        let external_payment_id = parts[3].trim();
        if external_payment_id.is_empty() {
            return None;
        }

        Some(Self {
            place_id: PlaceId::new(place_id),
            tier,
            external_payment_id: external_payment_id.to_string(),
            tg_user_id: TgUserId::new(tg_user_id),
            source: PaymentSource::from_code(parts[5]),
        })
    }
}

impl fmt::Display for InvoicePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PAYLOAD_PREFIX}:{}:{}:{}:{}:{}",
            self.place_id,
            self.tier,
            self.external_payment_id,
            self.tg_user_id,
            self.source.code()
        )
    }
}
