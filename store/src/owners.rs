use bizpass_types::{
    OwnerRequest, OwnerRequestId, OwnerStatus, PlaceId, Subscription, TgUserId, Timestamp,
    UserBusiness,
};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{parsed, timestamp, timestamp_opt, ts};
use crate::places::place_from_row;
use crate::{StoreError, UnitOfWork};

const TABLE: &str = "business_owners";

const OWNER_COLUMNS: &str =
    "id, place_id, tg_user_id, role, status, created_at, approved_at, approved_by";

fn owner_from_row(row: &Row<'_>) -> rusqlite::Result<OwnerRequest> {
    Ok(OwnerRequest {
        id: OwnerRequestId::new(row.get("id")?),
        place_id: PlaceId::new(row.get("place_id")?),
        tg_user_id: TgUserId::new(row.get("tg_user_id")?),
        role: row.get("role")?,
        status: parsed(row, TABLE, "status")?,
        created_at: timestamp(row, TABLE, "created_at")?,
        approved_at: timestamp_opt(row, TABLE, "approved_at")?,
        approved_by: row.get::<_, Option<i64>>("approved_by")?.map(TgUserId::new),
    })
}

impl UnitOfWork<'_> {
    /// Insert a `pending` request.
    ///
    /// Fails with [`StoreError::Constraint`] when the place already has one.
    pub fn insert_owner_request(
        &self,
        place: PlaceId,
        user: TgUserId,
        role: &str,
        now: Timestamp,
    ) -> Result<OwnerRequest, StoreError> {
        self.conn.execute(
            "INSERT INTO business_owners(place_id, tg_user_id, role, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            params![place.value(), user.value(), role, ts(now)],
        )?;
        Ok(OwnerRequest {
            id: OwnerRequestId::new(self.conn.last_insert_rowid()),
            place_id: place,
            tg_user_id: user,
            role: role.to_string(),
            status: OwnerStatus::Pending,
            created_at: now,
            approved_at: None,
            approved_by: None,
        })
    }

    pub fn owner_request(&self, id: OwnerRequestId) -> Result<Option<OwnerRequest>, StoreError> {
        let sql = format!("SELECT {OWNER_COLUMNS} FROM business_owners WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.value()], owner_from_row)
            .optional()?)
    }

    pub fn pending_request_for_place(
        &self,
        place: PlaceId,
    ) -> Result<Option<OwnerRequest>, StoreError> {
        let sql = format!(
            "SELECT {OWNER_COLUMNS} FROM business_owners
              WHERE place_id = ?1 AND status = 'pending'"
        );
        Ok(self
            .conn
            .query_row(&sql, params![place.value()], owner_from_row)
            .optional()?)
    }

    /// Move a `pending` request to a terminal status.
    ///
    /// Returns `false` when the row was no longer pending.
    pub fn resolve_owner_request(
        &self,
        id: OwnerRequestId,
        status: OwnerStatus,
        actor: TgUserId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        debug_assert!(status.is_terminal());
        let changed = self.conn.execute(
            "UPDATE business_owners
                SET status = ?2, approved_at = ?3, approved_by = ?4
              WHERE id = ?1 AND status = 'pending'",
            params![id.value(), status.as_str(), ts(now), actor.value()],
        )?;
        Ok(changed == 1)
    }

    pub fn approved_owner_count(&self, place: PlaceId) -> Result<u32, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM business_owners WHERE place_id = ?1 AND status = 'approved'",
            params![place.value()],
            |row| row.get(0),
        )?)
    }

    pub fn is_approved_owner(&self, user: TgUserId, place: PlaceId) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM business_owners
                  WHERE tg_user_id = ?1 AND place_id = ?2 AND status = 'approved'
                  LIMIT 1",
                params![user.value(), place.value()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    pub fn pending_owner_requests(&self, limit: u32) -> Result<Vec<OwnerRequest>, StoreError> {
        let sql = format!(
            "SELECT {OWNER_COLUMNS} FROM business_owners
              WHERE status = 'pending'
              ORDER BY created_at, id
              LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit], owner_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every ownership row of `user`, approved first, then pending, then rejected.
    pub fn user_businesses(&self, user: TgUserId) -> Result<Vec<UserBusiness>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT bo.id AS owner_id, bo.place_id AS owner_place_id, bo.tg_user_id, bo.role,
                    bo.status AS owner_status, bo.created_at AS owner_created_at,
                    bo.approved_at, bo.approved_by,
                    p.id, p.service_id, p.name, p.description, p.address, p.is_published,
                    p.business_enabled, p.is_verified, p.verified_tier, p.verified_until,
                    bs.tier AS sub_tier, bs.status AS sub_status, bs.starts_at AS sub_starts_at,
                    bs.expires_at AS sub_expires_at, bs.created_at AS sub_created_at,
                    bs.updated_at AS sub_updated_at
               FROM business_owners bo
               JOIN places p ON p.id = bo.place_id
               LEFT JOIN business_subscriptions bs ON bs.place_id = bo.place_id
              WHERE bo.tg_user_id = ?1
              ORDER BY
                CASE bo.status WHEN 'approved' THEN 0 WHEN 'pending' THEN 1 ELSE 2 END,
                p.name ASC",
        )?;
        let rows = stmt
            .query_map(params![user.value()], |row| {
                let owner = OwnerRequest {
                    id: OwnerRequestId::new(row.get("owner_id")?),
                    place_id: PlaceId::new(row.get("owner_place_id")?),
                    tg_user_id: TgUserId::new(row.get("tg_user_id")?),
                    role: row.get("role")?,
                    status: parsed(row, TABLE, "owner_status")?,
                    created_at: timestamp(row, TABLE, "owner_created_at")?,
                    approved_at: timestamp_opt(row, TABLE, "approved_at")?,
                    approved_by: row.get::<_, Option<i64>>("approved_by")?.map(TgUserId::new),
                };
                let place = place_from_row(row)?;
                let subscription = match row.get::<_, Option<String>>("sub_tier")? {
                    Some(_) => Some(Subscription {
                        place_id: place.id,
                        tier: parsed(row, "business_subscriptions", "sub_tier")?,
                        status: parsed(row, "business_subscriptions", "sub_status")?,
                        starts_at: timestamp_opt(row, "business_subscriptions", "sub_starts_at")?,
                        expires_at: timestamp_opt(row, "business_subscriptions", "sub_expires_at")?,
                        created_at: timestamp(row, "business_subscriptions", "sub_created_at")?,
                        updated_at: timestamp(row, "business_subscriptions", "sub_updated_at")?,
                    }),
                    None => None,
                };
                Ok(UserBusiness {
                    owner,
                    place,
                    subscription,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
