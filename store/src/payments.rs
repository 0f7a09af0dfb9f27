use bizpass_types::{PaymentEvent, PaymentEventId, PaymentEventType, PlaceId, Tier, Timestamp};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{parsed, timestamp, ts};
use crate::{StoreError, UnitOfWork};

const TABLE: &str = "business_payment_events";

const EVENT_COLUMNS: &str = "id, provider, external_payment_id, event_type, place_id, tier, \
     amount, currency, status, raw_payload, created_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentEvent> {
    Ok(PaymentEvent {
        id: PaymentEventId::new(row.get("id")?),
        provider: row.get("provider")?,
        external_payment_id: row.get("external_payment_id")?,
        event_type: parsed(row, TABLE, "event_type")?,
        place_id: PlaceId::new(row.get("place_id")?),
        tier: parsed(row, TABLE, "tier")?,
        amount: row.get("amount")?,
        currency: row.get("currency")?,
        status: row.get("status")?,
        raw_payload: row.get("raw_payload")?,
        created_at: timestamp(row, TABLE, "created_at")?,
    })
}

/// Ledger row to append.
#[derive(Debug, Clone, Copy)]
pub struct NewPaymentEvent<'a> {
    pub provider: &'a str,
    pub external_payment_id: &'a str,
    pub event_type: PaymentEventType,
    pub place_id: PlaceId,
    pub tier: Tier,
    pub amount: i64,
    pub currency: &'a str,
    pub status: &'a str,
    pub raw_payload: Option<&'a str>,
}

impl UnitOfWork<'_> {
    /// Append a ledger row unless its idempotency triple is already present.
    ///
    /// Returns the new row id, or `None` for a replay.
    pub fn insert_payment_event(
        &self,
        event: &NewPaymentEvent<'_>,
        now: Timestamp,
    ) -> Result<Option<PaymentEventId>, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO business_payment_events(
                 provider, external_payment_id, event_type, place_id, tier,
                 amount, currency, status, raw_payload, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(provider, external_payment_id, event_type) DO NOTHING",
            params![
                event.provider,
                event.external_payment_id,
                event.event_type.as_str(),
                event.place_id.value(),
                event.tier.as_str(),
                event.amount,
                event.currency,
                event.status,
                event.raw_payload,
                ts(now)
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(PaymentEventId::new(self.conn.last_insert_rowid())))
    }

    pub fn payment_event(&self, id: PaymentEventId) -> Result<Option<PaymentEvent>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM business_payment_events WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.value()], event_from_row)
            .optional()?)
    }

    pub fn find_payment_event(
        &self,
        provider: &str,
        external_payment_id: &str,
        event_type: PaymentEventType,
    ) -> Result<Option<PaymentEvent>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM business_payment_events
              WHERE provider = ?1 AND external_payment_id = ?2 AND event_type = ?3"
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                params![provider, external_payment_id, event_type.as_str()],
                event_from_row,
            )
            .optional()?)
    }

    /// Ledger rows for `place`, newest first.
    pub fn payment_events_for_place(
        &self,
        place: PlaceId,
        limit: u32,
    ) -> Result<Vec<PaymentEvent>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM business_payment_events
              WHERE place_id = ?1
              ORDER BY id DESC
              LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![place.value(), limit], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
