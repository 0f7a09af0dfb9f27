//! Single-use claim tokens.
//!
//! At most one token per place is `active`; every create or rotate revokes
//! the previous one in the same unit of work. Consumption is a conditional
//! update, so of two concurrent claims only one sees an affected row.

use bizpass_store::UnitOfWork;
use bizpass_types::{
    AuditAction, ClaimToken, ClaimTokenStatus, OwnerRequestId, Place, PlaceId, TgUserId,
    Timestamp, format_timestamp,
};
use chrono::Duration;
use serde_json::json;

use crate::moderation::insert_pending_request;
use crate::service::{audit, require_place};
use crate::{AdminEvent, BusinessService, ServiceError, ServiceResult, ValidationCode};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_DRAWS: usize = 8;

/// Token handed to an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: ClaimToken,
    /// `false` if an unexpired active token was returned as-is.
    pub created: bool,
}

/// Outcome of [`BusinessService::bulk_rotate_claim_tokens`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkRotation {
    pub total_places: usize,
    pub rotated: usize,
    pub failed: usize,
}

fn draw_secret(length: usize) -> String {
    (0..length)
        .map(|_| char::from(ALPHABET[rand::random_range(0..ALPHABET.len())]))
        .collect()
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn token_payload(token: &ClaimToken) -> serde_json::Value {
    json!({
        "token_id": token.id,
        "token": token.masked(),
        "expires_at": token.expires_at.map(format_timestamp),
    })
}

impl BusinessService {
    /// Revoke whatever is active for `place` and insert a fresh token.
    fn issue_in(
        &self,
        uow: &UnitOfWork<'_>,
        place: PlaceId,
        actor: TgUserId,
        now: Timestamp,
    ) -> ServiceResult<(ClaimToken, usize)> {
        let settings = &self.settings.tokens;
        let revoked = uow.revoke_active_claim_tokens(place)?;

        let mut secret = None;
        for _ in 0..MAX_DRAWS {
            let candidate = draw_secret(settings.length);
            if !uow.claim_token_exists(&candidate)? {
                secret = Some(candidate);
                break;
            }
        }
        let Some(secret) = secret else {
            return Err(ServiceError::validation(
                ValidationCode::TokenGeneration,
                "Could not generate a unique claim token, try again.",
            ));
        };

        let expires_at = now + Duration::hours(i64::from(settings.ttl_hours));
        let token = uow.insert_claim_token(
            place,
            &secret,
            settings.attempts,
            now,
            Some(expires_at),
            Some(actor),
        )?;
        Ok((token, revoked))
    }

    /// Current active token for `place`, or a new one if there is none or it
    /// has expired.
    pub fn get_or_create_claim_token(
        &self,
        actor: TgUserId,
        place: PlaceId,
    ) -> ServiceResult<IssuedToken> {
        let cap = self.access.require_admin(actor)?;
        let now = self.now();
        let issued = self.write("get_or_create_claim_token", |uow| {
            require_place(uow, place)?;
            if let Some(token) = uow.active_claim_token(place)?
                && !token.is_expired_at(now)
            {
                return Ok(IssuedToken {
                    token,
                    created: false,
                });
            }
            let (token, _) = self.issue_in(uow, place, cap.actor(), now)?;
            audit(
                uow,
                place,
                Some(cap.actor()),
                AuditAction::ClaimTokenCreated,
                &token_payload(&token),
                now,
            )?;
            Ok(IssuedToken {
                token,
                created: true,
            })
        })?;
        if issued.created {
            tracing::info!(place_id = %place, token = %issued.token.masked(), "Claim token created");
        }
        Ok(issued)
    }

    pub fn rotate_claim_token(&self, actor: TgUserId, place: PlaceId) -> ServiceResult<ClaimToken> {
        let cap = self.access.require_admin(actor)?;
        let now = self.now();
        let token = self.write("rotate_claim_token", |uow| {
            require_place(uow, place)?;
            let (token, revoked) = self.issue_in(uow, place, cap.actor(), now)?;
            let mut payload = token_payload(&token);
            payload["revoked"] = json!(revoked);
            audit(
                uow,
                place,
                Some(cap.actor()),
                AuditAction::ClaimTokenRotated,
                &payload,
                now,
            )?;
            Ok(token)
        })?;
        tracing::info!(place_id = %place, token = %token.masked(), "Claim token rotated");
        Ok(token)
    }

    /// Rotate the token of every place, one unit of work per place.
    ///
    /// A failing place is logged and counted; the sweep carries on.
    pub fn bulk_rotate_claim_tokens(&self, actor: TgUserId) -> ServiceResult<BulkRotation> {
        let cap = self.access.require_admin(actor)?;
        let places = self.read("all_place_ids", |uow| Ok(uow.all_place_ids()?))?;
        let mut stats = BulkRotation {
            total_places: places.len(),
            ..BulkRotation::default()
        };

        for place in places {
            let now = self.now();
            let result = self.write("bulk_rotate_claim_token", |uow| {
                let (token, revoked) = self.issue_in(uow, place, cap.actor(), now)?;
                let mut payload = token_payload(&token);
                payload["revoked"] = json!(revoked);
                audit(
                    uow,
                    place,
                    Some(cap.actor()),
                    AuditAction::ClaimTokenRotatedBulk,
                    &payload,
                    now,
                )
            });
            match result {
                Ok(()) => stats.rotated += 1,
                Err(err) => {
                    tracing::warn!(place_id = %place, error = %err, "Claim token rotation failed");
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            total = stats.total_places,
            rotated = stats.rotated,
            failed = stats.failed,
            "Bulk claim token rotation finished"
        );
        Ok(stats)
    }

    /// Spend `raw` to file a pending ownership request for its place.
    pub fn claim_business_by_token(
        &self,
        user: TgUserId,
        raw: &str,
    ) -> ServiceResult<OwnerRequestId> {
        let secret = normalize(raw);
        if secret.is_empty() {
            return Err(ServiceError::validation(
                ValidationCode::TokenMissing,
                "Please enter a claim code.",
            ));
        }

        let now = self.now();
        let (request, place, masked) = self.write("claim_business_by_token", |uow| {
            let Some(token) = uow.claim_token_by_secret(&secret)? else {
                return Err(ServiceError::validation(
                    ValidationCode::TokenNotFound,
                    "This claim code does not exist.",
                ));
            };
            check_claimable(&token, now)?;
            let place: Place = require_place(uow, token.place_id)?;
            let request = insert_pending_request(uow, place.id, user, now)?;
            if !uow.consume_claim_token(token.id, user, now)? {
                return Err(token_inactive());
            }
            uow.ensure_subscription(place.id, now)?;
            audit(
                uow,
                place.id,
                Some(user),
                AuditAction::OwnerClaimRequested,
                &json!({ "owner_id": request.id, "token_id": token.id }),
                now,
            )?;
            Ok((request, place, token.masked()))
        })?;

        tracing::info!(
            place_id = %place.id,
            request_id = %request.id,
            token = %masked,
            "Claim token redeemed"
        );
        self.notify(&AdminEvent::OwnerClaimRequested {
            request: request.id,
            place: place.id,
            place_name: place.name,
            owner: user,
        });
        Ok(request.id)
    }

    /// Newest first, for the admin token history view.
    pub fn recent_claim_tokens(
        &self,
        actor: TgUserId,
        place: PlaceId,
    ) -> ServiceResult<Vec<ClaimToken>> {
        self.access.require_admin(actor)?;
        self.read("recent_claim_tokens", |uow| {
            Ok(uow.recent_claim_tokens(place, 10)?)
        })
    }
}

fn token_inactive() -> ServiceError {
    ServiceError::validation(
        ValidationCode::TokenInactive,
        "This claim code has already been used or revoked.",
    )
}

fn check_claimable(token: &ClaimToken, now: Timestamp) -> ServiceResult<()> {
    if token.status != ClaimTokenStatus::Active {
        return Err(token_inactive());
    }
    if token.is_expired_at(now) {
        return Err(ServiceError::validation(
            ValidationCode::TokenExpired,
            "This claim code has expired. Ask an administrator for a new one.",
        ));
    }
    if token.attempts_left == 0 {
        return Err(ServiceError::validation(
            ValidationCode::TokenExhausted,
            "This claim code has no attempts left.",
        ));
    }
    Ok(())
}
