use bizpass_types::{ClaimToken, ClaimTokenId, PlaceId, TgUserId, Timestamp};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{parsed, timestamp, timestamp_opt, ts, ts_opt};
use crate::{StoreError, UnitOfWork};

const TABLE: &str = "business_claim_tokens";

const TOKEN_COLUMNS: &str = "id, place_id, token, status, attempts_left, created_at, \
     expires_at, created_by, used_at, used_by";

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<ClaimToken> {
    Ok(ClaimToken {
        id: ClaimTokenId::new(row.get("id")?),
        place_id: PlaceId::new(row.get("place_id")?),
        token: row.get("token")?,
        status: parsed(row, TABLE, "status")?,
        attempts_left: row.get("attempts_left")?,
        created_at: timestamp(row, TABLE, "created_at")?,
        expires_at: timestamp_opt(row, TABLE, "expires_at")?,
        created_by: row.get::<_, Option<i64>>("created_by")?.map(TgUserId::new),
        used_at: timestamp_opt(row, TABLE, "used_at")?,
        used_by: row.get::<_, Option<i64>>("used_by")?.map(TgUserId::new),
    })
}

impl UnitOfWork<'_> {
    pub fn active_claim_token(&self, place: PlaceId) -> Result<Option<ClaimToken>, StoreError> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM business_claim_tokens
              WHERE place_id = ?1 AND status = 'active'"
        );
        Ok(self
            .conn
            .query_row(&sql, params![place.value()], token_from_row)
            .optional()?)
    }

    pub fn claim_token_by_secret(&self, secret: &str) -> Result<Option<ClaimToken>, StoreError> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM business_claim_tokens WHERE token = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![secret], token_from_row)
            .optional()?)
    }

    pub fn claim_token_exists(&self, secret: &str) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM business_claim_tokens WHERE token = ?1",
                params![secret],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    /// Revoke every active token of `place`. Returns how many were revoked.
    pub fn revoke_active_claim_tokens(&self, place: PlaceId) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "UPDATE business_claim_tokens SET status = 'revoked'
              WHERE place_id = ?1 AND status = 'active'",
            params![place.value()],
        )?)
    }

    /// Insert a new `active` token. The caller revokes the previous one first.
    pub fn insert_claim_token(
        &self,
        place: PlaceId,
        secret: &str,
        attempts: u32,
        now: Timestamp,
        expires_at: Option<Timestamp>,
        created_by: Option<TgUserId>,
    ) -> Result<ClaimToken, StoreError> {
        self.conn.execute(
            "INSERT INTO business_claim_tokens(
                 place_id, token, status, attempts_left, created_at, expires_at, created_by
             ) VALUES (?1, ?2, 'active', ?3, ?4, ?5, ?6)",
            params![
                place.value(),
                secret,
                attempts,
                ts(now),
                ts_opt(expires_at),
                created_by.map(TgUserId::value)
            ],
        )?;
        let id = ClaimTokenId::new(self.conn.last_insert_rowid());
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM business_claim_tokens WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.value()], token_from_row)?)
    }

    /// Mark the token `used` if it is still active, unexpired and has
    /// attempts left. Returns `false` when another claim got there first.
    pub fn consume_claim_token(
        &self,
        id: ClaimTokenId,
        user: TgUserId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE business_claim_tokens
                SET status = 'used',
                    used_at = ?3,
                    used_by = ?2,
                    attempts_left = attempts_left - 1
              WHERE id = ?1
                AND status = 'active'
                AND attempts_left > 0
                AND (expires_at IS NULL OR expires_at > ?3)",
            params![id.value(), user.value(), ts(now)],
        )?;
        Ok(changed == 1)
    }

    pub fn recent_claim_tokens(
        &self,
        place: PlaceId,
        limit: u32,
    ) -> Result<Vec<ClaimToken>, StoreError> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM business_claim_tokens
              WHERE place_id = ?1
              ORDER BY id DESC
              LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![place.value(), limit], token_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
