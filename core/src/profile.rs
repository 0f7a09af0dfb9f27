//! Owner edits of listing fields.

use bizpass_types::{AuditAction, PlaceField, PlaceId, TgUserId, UserBusiness};
use serde_json::json;

use crate::moderation::check_len;
use crate::service::{audit, require_approved_owner, require_place};
use crate::{BusinessService, ServiceError, ServiceResult, ValidationCode};

impl BusinessService {
    pub fn update_place_field(
        &self,
        user: TgUserId,
        place: PlaceId,
        field: PlaceField,
        value: &str,
    ) -> ServiceResult<()> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ServiceError::validation(
                ValidationCode::InvalidInput,
                "The value must not be empty.",
            ));
        }
        check_len(field.as_str(), value, field.max_len())?;

        let now = self.now();
        self.write("update_place_field", |uow| {
            let place = require_place(uow, place)?;
            require_approved_owner(
                uow,
                user,
                place.id,
                "You can only edit your own approved businesses.",
            )?;
            uow.update_place_field(place.id, field, value)?;
            audit(
                uow,
                place.id,
                Some(user),
                AuditAction::PlaceProfileUpdated,
                &json!({ "field": field, "value": value }),
                now,
            )
        })?;
        tracing::info!(place_id = %place, field = %field, "Place profile updated");
        Ok(())
    }

    /// Every ownership row of `user`, approved first, with place and subscription.
    pub fn list_user_businesses(&self, user: TgUserId) -> ServiceResult<Vec<UserBusiness>> {
        self.read("list_user_businesses", |uow| Ok(uow.user_businesses(user)?))
    }
}
