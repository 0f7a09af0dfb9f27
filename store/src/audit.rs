use bizpass_types::{AuditAction, AuditEntry, AuditEntryId, PlaceId, TgUserId, Timestamp};
use rusqlite::{Row, params};

use crate::codec::{timestamp, ts};
use crate::{StoreError, UnitOfWork};

const TABLE: &str = "business_audit_log";

const AUDIT_COLUMNS: &str = "id, place_id, actor_tg_user_id, action, payload_json, created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let raw: String = row.get("payload_json")?;
    let payload_json = serde_json::from_str(&raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })?;
    Ok(AuditEntry {
        id: AuditEntryId::new(row.get("id")?),
        place_id: PlaceId::new(row.get("place_id")?),
        action: row.get("action")?,
        payload_json,
        actor_id: row
            .get::<_, Option<i64>>("actor_tg_user_id")?
            .map(TgUserId::new),
        created_at: timestamp(row, TABLE, "created_at")?,
    })
}

impl UnitOfWork<'_> {
    /// Append one audit row. The table rejects updates and deletes.
    pub fn append_audit(
        &self,
        place: PlaceId,
        actor: Option<TgUserId>,
        action: AuditAction,
        payload: &serde_json::Value,
        now: Timestamp,
    ) -> Result<AuditEntryId, StoreError> {
        self.conn.execute(
            "INSERT INTO business_audit_log(place_id, actor_tg_user_id, action, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                place.value(),
                actor.map(TgUserId::value),
                action.as_str(),
                payload.to_string(),
                ts(now)
            ],
        )?;
        Ok(AuditEntryId::new(self.conn.last_insert_rowid()))
    }

    /// Audit rows for `place` in insertion order.
    pub fn audit_entries_for(&self, place: PlaceId) -> Result<Vec<AuditEntry>, StoreError> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM business_audit_log WHERE place_id = ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![place.value()], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn audit_entries_with_action(
        &self,
        action: AuditAction,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let sql =
            format!("SELECT {AUDIT_COLUMNS} FROM business_audit_log WHERE action = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![action.as_str()], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
