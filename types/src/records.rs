//! Typed rows for every entity the entitlement engine reads or writes.

use serde::Serialize;

use crate::{
    AuditEntryId, CategoryId, ClaimTokenId, ClaimTokenStatus, OwnerRequestId, OwnerStatus,
    PaymentEventId, PaymentEventType, PlaceId, SubscriptionStatus, TgUserId, Tier, Timestamp,
};

/// Listing as seen by this engine.
///
/// The four verification fields (`is_verified`, `verified_tier`,
/// `verified_until` and, on moderation, `business_enabled`) are written only by
/// the activation and revocation paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Place {
    pub id: PlaceId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub address: String,
    pub is_published: bool,
    pub business_enabled: bool,
    pub is_verified: bool,
    pub verified_tier: Option<Tier>,
    pub verified_until: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerRequest {
    pub id: OwnerRequestId,
    pub place_id: PlaceId,
    pub tg_user_id: TgUserId,
    pub role: String,
    pub status: OwnerStatus,
    pub created_at: Timestamp,
    pub approved_at: Option<Timestamp>,
    pub approved_by: Option<TgUserId>,
}

/// One row per place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub place_id: PlaceId,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub starts_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Whether the place mirror should show the verified badge.
    #[must_use]
    pub fn grants_verification(&self) -> bool {
        self.status == SubscriptionStatus::Active && self.tier.is_paid()
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimToken {
    pub id: ClaimTokenId,
    pub place_id: PlaceId,
    pub token: String,
    pub status: ClaimTokenStatus,
    pub attempts_left: u32,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub created_by: Option<TgUserId>,
    pub used_at: Option<Timestamp>,
    pub used_by: Option<TgUserId>,
}

impl ClaimToken {
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }

    /// Secret with everything but the last three characters hidden, for logs.
    #[must_use]
    pub fn masked(&self) -> String {
        mask_token(&self.token)
    }
}

#[must_use]
pub fn mask_token(token: &str) -> String {
    let visible: String = token
        .chars()
        .rev()
        .take(3)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{visible}")
}

/// One ownership row joined with its place and subscription, for owner menus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserBusiness {
    pub owner: OwnerRequest,
    pub place: Place,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentEvent {
    pub id: PaymentEventId,
    pub provider: String,
    pub external_payment_id: String,
    pub event_type: PaymentEventType,
    pub place_id: PlaceId,
    pub tier: Tier,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub raw_payload: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub place_id: PlaceId,
    pub action: String,
    pub payload_json: serde_json::Value,
    pub actor_id: Option<TgUserId>,
    pub created_at: Timestamp,
}
