//! Business registration and the owner request lifecycle.
//!
//! `pending -> approved | rejected`, both terminal. Every transition is a
//! conditional update on `status = 'pending'`, so two admins racing on the
//! same request cannot both win.

use bizpass_store::UnitOfWork;
use bizpass_types::{
    AuditAction, OwnerRequest, OwnerRequestId, OwnerStatus, PlaceId, TgUserId, Timestamp,
};
use serde_json::json;

use crate::errors::Missing;
use crate::service::{audit, require_place};
use crate::subscriptions::sync_mirror;
use crate::{AdminEvent, BusinessService, ServiceError, ServiceResult, ValidationCode, ValidationError};

const OWNER_ROLE: &str = "owner";
const PENDING_LIST_LIMIT: u32 = 50;

const MAX_CATEGORY_LEN: usize = 80;
const MAX_NAME_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 1200;
const MAX_ADDRESS_LEN: usize = 300;

/// Owner-submitted listing for a business that is not in the directory yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBusiness {
    pub category: String,
    pub name: String,
    pub description: String,
    pub address: String,
}

impl NewBusiness {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    fn normalized(&self) -> Result<NewBusiness, ValidationError> {
        let business = NewBusiness {
            category: self.category.trim().to_string(),
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            address: self.address.trim().to_string(),
        };
        if business.category.is_empty() || business.name.is_empty() {
            return Err(ValidationError::new(
                ValidationCode::InvalidInput,
                "Category and business name are required.",
            ));
        }
        check_len("category", &business.category, MAX_CATEGORY_LEN)?;
        check_len("name", &business.name, MAX_NAME_LEN)?;
        check_len("description", &business.description, MAX_DESCRIPTION_LEN)?;
        check_len("address", &business.address, MAX_ADDRESS_LEN)?;
        Ok(business)
    }
}

pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            ValidationCode::InvalidInput,
            format!("The {field} must be at most {max} characters."),
        ));
    }
    Ok(())
}

/// Result of [`BusinessService::register_new_business`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub place: PlaceId,
    pub owner: OwnerRequest,
}

/// Insert a `pending` request after the one-pending-per-place and
/// already-owner checks.
pub(crate) fn insert_pending_request(
    uow: &UnitOfWork<'_>,
    place: PlaceId,
    user: TgUserId,
    now: Timestamp,
) -> ServiceResult<OwnerRequest> {
    if uow.is_approved_owner(user, place)? {
        return Err(ServiceError::validation(
            ValidationCode::AlreadyOwner,
            "You already manage this business.",
        ));
    }
    if uow.pending_request_for_place(place)?.is_some() {
        return Err(ServiceError::validation(
            ValidationCode::PendingRequestExists,
            "An ownership request for this business is already awaiting review.",
        ));
    }
    Ok(uow.insert_owner_request(place, user, OWNER_ROLE, now)?)
}

fn require_pending(uow: &UnitOfWork<'_>, id: OwnerRequestId) -> ServiceResult<OwnerRequest> {
    let request = uow
        .owner_request(id)?
        .ok_or(ServiceError::NotFound(Missing::OwnerRequest(id)))?;
    if request.status != OwnerStatus::Pending {
        return Err(ValidationError::already_processed().into());
    }
    Ok(request)
}

impl BusinessService {
    /// Create a draft place plus a pending owner request for it.
    pub fn register_new_business(
        &self,
        user: TgUserId,
        business: NewBusiness,
    ) -> ServiceResult<Registration> {
        let business = business.normalized()?;
        let now = self.now();
        let registration = self.write("register_new_business", |uow| {
            let category = uow.category_id_for(&business.category)?;
            let place = uow.insert_place(
                category,
                &business.name,
                &business.description,
                &business.address,
                now,
            )?;
            let owner = uow.insert_owner_request(place, user, OWNER_ROLE, now)?;
            uow.ensure_subscription(place, now)?;
            audit(
                uow,
                place,
                Some(user),
                AuditAction::OwnerRequestCreated,
                &json!({
                    "owner_id": owner.id,
                    "source": "new_business",
                    "category_name": business.category,
                }),
                now,
            )?;
            Ok(Registration { place, owner })
        })?;

        tracing::info!(
            place_id = %registration.place,
            owner_id = %registration.owner.id,
            "Business registered"
        );
        self.notify(&AdminEvent::OwnerRequestCreated {
            request: registration.owner.id,
            place: registration.place,
            place_name: business.name,
            owner: user,
        });
        Ok(registration)
    }

    /// Ask to manage an existing place.
    pub fn create_owner_request(
        &self,
        user: TgUserId,
        place: PlaceId,
    ) -> ServiceResult<OwnerRequest> {
        let now = self.now();
        let (request, place_name) = self.write("create_owner_request", |uow| {
            let place = require_place(uow, place)?;
            let request = insert_pending_request(uow, place.id, user, now)?;
            audit(
                uow,
                place.id,
                Some(user),
                AuditAction::OwnerRequestCreated,
                &json!({ "owner_id": request.id, "source": "existing_place" }),
                now,
            )?;
            Ok((request, place.name))
        })?;

        self.notify(&AdminEvent::OwnerRequestCreated {
            request: request.id,
            place: request.place_id,
            place_name,
            owner: user,
        });
        Ok(request)
    }

    /// Approve a pending request and publish its place.
    pub fn approve_owner_request(
        &self,
        actor: TgUserId,
        id: OwnerRequestId,
    ) -> ServiceResult<OwnerRequest> {
        let cap = self.access.require_admin(actor)?;
        let now = self.now();
        let approved = self.write("approve_owner_request", |uow| {
            let request = require_pending(uow, id)?;
            if !uow.resolve_owner_request(id, OwnerStatus::Approved, cap.actor(), now)? {
                return Err(ValidationError::already_processed().into());
            }
            uow.publish_place(request.place_id)?;
            let subscription = uow.ensure_subscription(request.place_id, now)?;
            if subscription.grants_verification() && !subscription.is_expired_at(now) {
                sync_mirror(uow, &subscription)?;
            }
            audit(
                uow,
                request.place_id,
                Some(cap.actor()),
                AuditAction::OwnerRequestApproved,
                &json!({ "owner_id": request.id, "owner_tg_user_id": request.tg_user_id }),
                now,
            )?;
            uow.owner_request(id)?
                .ok_or(ServiceError::NotFound(Missing::OwnerRequest(id)))
        })?;

        tracing::info!(
            request_id = %approved.id,
            place_id = %approved.place_id,
            actor = %cap.actor(),
            "Owner request approved"
        );
        self.notify(&AdminEvent::OwnerRequestApproved {
            request: approved.id,
            place: approved.place_id,
            owner: approved.tg_user_id,
            actor: cap.actor(),
        });
        Ok(approved)
    }

    /// Reject a pending request. The place is disabled only if nobody else
    /// owns it.
    pub fn reject_owner_request(
        &self,
        actor: TgUserId,
        id: OwnerRequestId,
    ) -> ServiceResult<OwnerRequest> {
        let cap = self.access.require_admin(actor)?;
        let now = self.now();
        let rejected = self.write("reject_owner_request", |uow| {
            let request = require_pending(uow, id)?;
            if !uow.resolve_owner_request(id, OwnerStatus::Rejected, cap.actor(), now)? {
                return Err(ValidationError::already_processed().into());
            }
            if uow.approved_owner_count(request.place_id)? == 0 {
                uow.disable_place(request.place_id)?;
            }
            audit(
                uow,
                request.place_id,
                Some(cap.actor()),
                AuditAction::OwnerRequestRejected,
                &json!({ "owner_id": request.id, "owner_tg_user_id": request.tg_user_id }),
                now,
            )?;
            uow.owner_request(id)?
                .ok_or(ServiceError::NotFound(Missing::OwnerRequest(id)))
        })?;

        tracing::info!(
            request_id = %rejected.id,
            place_id = %rejected.place_id,
            actor = %cap.actor(),
            "Owner request rejected"
        );
        self.notify(&AdminEvent::OwnerRequestRejected {
            request: rejected.id,
            place: rejected.place_id,
            owner: rejected.tg_user_id,
            actor: cap.actor(),
        });
        Ok(rejected)
    }

    /// Oldest pending requests first.
    pub fn pending_owner_requests(&self, actor: TgUserId) -> ServiceResult<Vec<OwnerRequest>> {
        self.access.require_admin(actor)?;
        self.read("pending_owner_requests", |uow| {
            Ok(uow.pending_owner_requests(PENDING_LIST_LIMIT)?)
        })
    }
}
