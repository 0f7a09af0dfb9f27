use bizpass_types::{CategoryId, Place, PlaceField, PlaceId, Tier, Timestamp};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{parsed_opt, timestamp_opt, ts, ts_opt};
use crate::{StoreError, UnitOfWork};

const TABLE: &str = "places";

const PLACE_COLUMNS: &str = "id, service_id, name, description, address, is_published, \
     business_enabled, is_verified, verified_tier, verified_until";

pub(crate) fn place_from_row(row: &Row<'_>) -> rusqlite::Result<Place> {
    Ok(Place {
        id: PlaceId::new(row.get("id")?),
        category_id: CategoryId::new(row.get("service_id")?),
        name: row.get("name")?,
        description: row.get("description")?,
        address: row.get("address")?,
        is_published: row.get("is_published")?,
        business_enabled: row.get("business_enabled")?,
        is_verified: row.get("is_verified")?,
        verified_tier: parsed_opt(row, TABLE, "verified_tier")?,
        verified_until: timestamp_opt(row, TABLE, "verified_until")?,
    })
}

impl UnitOfWork<'_> {
    /// Id of the category named `name`, created on first use.
    pub fn category_id_for(&self, name: &str) -> Result<CategoryId, StoreError> {
        self.conn.execute(
            "INSERT INTO general_services(name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM general_services WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(CategoryId::new(id))
    }

    /// Insert an unpublished, disabled draft listing.
    pub fn insert_place(
        &self,
        category: CategoryId,
        name: &str,
        description: &str,
        address: &str,
        now: Timestamp,
    ) -> Result<PlaceId, StoreError> {
        self.conn.execute(
            "INSERT INTO places(service_id, name, description, address, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![category.value(), name, description, address, ts(now)],
        )?;
        Ok(PlaceId::new(self.conn.last_insert_rowid()))
    }

    pub fn place(&self, id: PlaceId) -> Result<Option<Place>, StoreError> {
        let sql = format!("SELECT {PLACE_COLUMNS} FROM places WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.value()], place_from_row)
            .optional()?)
    }

    pub fn all_place_ids(&self) -> Result<Vec<PlaceId>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM places ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0).map(PlaceId::new))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Enable the business and publish the listing if it is still a draft.
    pub fn publish_place(&self, id: PlaceId) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE places SET business_enabled = 1, is_published = 1 WHERE id = ?1",
            params![id.value()],
        )?;
        Ok(())
    }

    /// Disable and unpublish the listing and drop its verification mirror.
    pub fn disable_place(&self, id: PlaceId) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE places
                SET business_enabled = 0,
                    is_published = 0,
                    is_verified = 0,
                    verified_tier = NULL,
                    verified_until = NULL
              WHERE id = ?1",
            params![id.value()],
        )?;
        Ok(())
    }

    /// Write the verification mirror. Only the activation and revocation
    /// paths of the subscription service call this.
    pub fn set_verification_mirror(
        &self,
        id: PlaceId,
        verified: bool,
        tier: Option<Tier>,
        until: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE places
                SET is_verified = ?2, verified_tier = ?3, verified_until = ?4
              WHERE id = ?1",
            params![
                id.value(),
                verified,
                tier.map(Tier::as_str),
                ts_opt(until)
            ],
        )?;
        Ok(())
    }

    pub fn update_place_field(
        &self,
        id: PlaceId,
        field: PlaceField,
        value: &str,
    ) -> Result<bool, StoreError> {
        let sql = match field {
            PlaceField::Name => "UPDATE places SET name = ?2 WHERE id = ?1",
            PlaceField::Description => "UPDATE places SET description = ?2 WHERE id = ?1",
            PlaceField::Address => "UPDATE places SET address = ?2 WHERE id = ?1",
        };
        Ok(self.conn.execute(sql, params![id.value(), value])? == 1)
    }
}
