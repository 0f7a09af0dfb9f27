use bizpass_types::{CategoryId, PlaceId, Subscription, SubscriptionStatus, Tier, Timestamp};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{parsed, timestamp, timestamp_opt, ts};
use crate::{StoreError, UnitOfWork};

const TABLE: &str = "business_subscriptions";

const SUBSCRIPTION_COLUMNS: &str =
    "place_id, tier, status, starts_at, expires_at, created_at, updated_at";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        place_id: PlaceId::new(row.get("place_id")?),
        tier: parsed(row, TABLE, "tier")?,
        status: parsed(row, TABLE, "status")?,
        starts_at: timestamp_opt(row, TABLE, "starts_at")?,
        expires_at: timestamp_opt(row, TABLE, "expires_at")?,
        created_at: timestamp(row, TABLE, "created_at")?,
        updated_at: timestamp(row, TABLE, "updated_at")?,
    })
}

/// Expiry-driven transition applied by the reconciliation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demotion {
    /// `active` past `expires_at` becomes `past_due`; tier is kept.
    ActiveToPastDue,
    /// `past_due` past the grace cutoff becomes `free/inactive`.
    PastDueToFree,
    /// `canceled` past `expires_at` becomes `free/inactive`.
    CanceledToFree,
}

impl Demotion {
    #[must_use]
    pub const fn source(self) -> SubscriptionStatus {
        match self {
            Demotion::ActiveToPastDue => SubscriptionStatus::Active,
            Demotion::PastDueToFree => SubscriptionStatus::PastDue,
            Demotion::CanceledToFree => SubscriptionStatus::Canceled,
        }
    }
}

impl UnitOfWork<'_> {
    pub fn subscription(&self, place: PlaceId) -> Result<Option<Subscription>, StoreError> {
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM business_subscriptions WHERE place_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![place.value()], subscription_from_row)
            .optional()?)
    }

    /// Return the row for `place`, creating `free/inactive` on first access.
    pub fn ensure_subscription(
        &self,
        place: PlaceId,
        now: Timestamp,
    ) -> Result<Subscription, StoreError> {
        self.conn.execute(
            "INSERT INTO business_subscriptions(place_id, tier, status, created_at, updated_at)
             VALUES (?1, 'free', 'inactive', ?2, ?2)
             ON CONFLICT(place_id) DO NOTHING",
            params![place.value(), ts(now)],
        )?;
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM business_subscriptions WHERE place_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![place.value()], subscription_from_row)?)
    }

    /// Another place in `category` that holds an active partner subscription.
    pub fn active_partner_in_category(
        &self,
        category: CategoryId,
        excluding: PlaceId,
    ) -> Result<Option<PlaceId>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT bs.place_id
                   FROM business_subscriptions bs
                   JOIN places p ON p.id = bs.place_id
                  WHERE p.service_id = ?1
                    AND bs.place_id != ?2
                    AND bs.tier = 'partner'
                    AND bs.status = 'active'
                  LIMIT 1",
                params![category.value(), excluding.value()],
                |row| row.get(0).map(PlaceId::new),
            )
            .optional()?)
    }

    /// Set `tier`, `status=active` and the period bounds.
    pub fn write_active(
        &self,
        place: PlaceId,
        tier: Tier,
        starts_at: Timestamp,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<Subscription, StoreError> {
        self.ensure_subscription(place, now)?;
        self.conn.execute(
            "UPDATE business_subscriptions
                SET tier = ?2, status = 'active', starts_at = ?3, expires_at = ?4, updated_at = ?5
              WHERE place_id = ?1",
            params![place.value(), tier.as_str(), ts(starts_at), ts(expires_at), ts(now)],
        )?;
        self.require_subscription(place)
    }

    /// Reset to `free/inactive` with no dates.
    pub fn write_free(&self, place: PlaceId, now: Timestamp) -> Result<Subscription, StoreError> {
        self.ensure_subscription(place, now)?;
        self.conn.execute(
            "UPDATE business_subscriptions
                SET tier = 'free', status = 'inactive', starts_at = NULL, expires_at = NULL,
                    updated_at = ?2
              WHERE place_id = ?1",
            params![place.value(), ts(now)],
        )?;
        self.require_subscription(place)
    }

    /// `active` to `canceled`, keeping tier and dates. Returns `false` if the
    /// row was not active.
    pub fn mark_canceled(&self, place: PlaceId, now: Timestamp) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE business_subscriptions
                SET status = 'canceled', updated_at = ?2
              WHERE place_id = ?1 AND status = 'active' AND tier != 'free'",
            params![place.value(), ts(now)],
        )?;
        Ok(changed == 1)
    }

    /// Apply `demotion` if the row still satisfies its predicate.
    ///
    /// `cutoff` is the instant `expires_at` must be strictly before. Returns
    /// whether the row changed.
    pub fn demote(
        &self,
        place: PlaceId,
        demotion: Demotion,
        cutoff: Timestamp,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let sql = match demotion {
            Demotion::ActiveToPastDue => {
                "UPDATE business_subscriptions
                    SET status = 'past_due', updated_at = ?3
                  WHERE place_id = ?1 AND status = 'active'
                    AND expires_at IS NOT NULL AND expires_at < ?2"
            }
            Demotion::PastDueToFree => {
                "UPDATE business_subscriptions
                    SET tier = 'free', status = 'inactive', starts_at = NULL, expires_at = NULL,
                        updated_at = ?3
                  WHERE place_id = ?1 AND status = 'past_due'
                    AND expires_at IS NOT NULL AND expires_at < ?2"
            }
            Demotion::CanceledToFree => {
                "UPDATE business_subscriptions
                    SET tier = 'free', status = 'inactive', starts_at = NULL, expires_at = NULL,
                        updated_at = ?3
                  WHERE place_id = ?1 AND status = 'canceled'
                    AND expires_at IS NOT NULL AND expires_at < ?2"
            }
        };
        let changed = self
            .conn
            .execute(sql, params![place.value(), ts(cutoff), ts(now)])?;
        Ok(changed == 1)
    }

    /// Places whose row is in `status` with `expires_at` strictly before
    /// `cutoff`. Only ids are read so one unreadable row cannot hide the rest.
    pub fn expired_place_ids(
        &self,
        status: SubscriptionStatus,
        cutoff: Timestamp,
    ) -> Result<Vec<PlaceId>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT place_id FROM business_subscriptions
              WHERE status = ?1 AND expires_at IS NOT NULL AND expires_at < ?2
              ORDER BY place_id",
        )?;
        let rows = stmt
            .query_map(params![status.as_str(), ts(cutoff)], |row| {
                row.get(0).map(PlaceId::new)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn subscription_count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM business_subscriptions", [], |row| {
                row.get(0)
            })?)
    }

    fn require_subscription(&self, place: PlaceId) -> Result<Subscription, StoreError> {
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM business_subscriptions WHERE place_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![place.value()], subscription_from_row)?)
    }
}
