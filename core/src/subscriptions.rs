//! Subscription and entitlement transitions.
//!
//! [`activate_in`] and [`set_free_in`] are the only writers of a place's
//! verification mirror besides the sweep's demotions. Partner exclusivity is
//! checked inside [`activate_in`], within the caller's immediate transaction,
//! so two concurrent activations in one category serialize on the write lock
//! and the second one observes the first.

use bizpass_store::{Demotion, UnitOfWork};
use bizpass_types::{
    AuditAction, Entitlement, Place, PlaceId, Subscription, SubscriptionStatus, TgUserId, Tier,
    Timestamp, format_timestamp, period_end,
};
use serde_json::json;

use crate::reconcile::demote_in;
use crate::service::{audit, require_approved_owner, require_place};
use crate::{BusinessService, ServiceError, ServiceResult, ValidationCode, ValidationError};

/// Activate `tier` for `months` periods starting at `now`.
pub(crate) fn activate_in(
    uow: &UnitOfWork<'_>,
    place: &Place,
    tier: Tier,
    months: u32,
    now: Timestamp,
) -> ServiceResult<Subscription> {
    if !tier.is_paid() {
        return Err(ServiceError::validation(
            ValidationCode::NotPaidTier,
            "Only paid tiers can be activated.",
        ));
    }
    if tier == Tier::Partner {
        release_lapsed_partner(uow, place, now)?;
    }
    ensure_partner_slot_free(uow, place, tier, now)?;

    let expires_at = period_end(now, months);
    let subscription = uow.write_active(place.id, tier, now, expires_at, now)?;
    sync_mirror(uow, &subscription)?;
    tracing::info!(
        place_id = %place.id,
        tier = %tier,
        expires_at = %format_timestamp(expires_at),
        "Subscription activated"
    );
    Ok(subscription)
}

/// Fail with `partner_slot_taken` if another place in the category holds an
/// unexpired active partner subscription.
///
/// A holder past `expires_at` does not block; [`activate_in`] demotes it to
/// `past_due` before writing so two active partner rows never coexist.
pub(crate) fn ensure_partner_slot_free(
    uow: &UnitOfWork<'_>,
    place: &Place,
    tier: Tier,
    now: Timestamp,
) -> ServiceResult<()> {
    if tier != Tier::Partner {
        return Ok(());
    }
    let Some(holder) = uow.active_partner_in_category(place.category_id, place.id)? else {
        return Ok(());
    };
    let lapsed = uow
        .subscription(holder)?
        .is_some_and(|sub| sub.is_expired_at(now));
    if lapsed {
        return Ok(());
    }
    tracing::info!(
        place_id = %place.id,
        holder = %holder,
        category_id = %place.category_id,
        "Partner slot already taken"
    );
    Err(ValidationError::partner_slot_taken().into())
}

/// Move an expired partner in `place`'s category to `past_due` ahead of the
/// sweep, with the same audit entry the sweep would write.
fn release_lapsed_partner(uow: &UnitOfWork<'_>, place: &Place, now: Timestamp) -> ServiceResult<()> {
    let Some(holder) = uow.active_partner_in_category(place.category_id, place.id)? else {
        return Ok(());
    };
    let Some(before) = uow.subscription(holder)? else {
        return Ok(());
    };
    if before.is_expired_at(now) && demote_in(uow, &before, Demotion::ActiveToPastDue, now, now)? {
        tracing::info!(
            place_id = %holder,
            claimant = %place.id,
            "Expired partner released its slot"
        );
    }
    Ok(())
}

/// Reset to `free/inactive` and clear the mirror.
pub(crate) fn set_free_in(
    uow: &UnitOfWork<'_>,
    place: PlaceId,
    now: Timestamp,
) -> ServiceResult<Subscription> {
    let subscription = uow.write_free(place, now)?;
    sync_mirror(uow, &subscription)?;
    Ok(subscription)
}

/// Copy the subscription onto the place: verified iff active and paid.
pub(crate) fn sync_mirror(uow: &UnitOfWork<'_>, subscription: &Subscription) -> ServiceResult<()> {
    if subscription.grants_verification() {
        uow.set_verification_mirror(
            subscription.place_id,
            true,
            Some(subscription.tier),
            subscription.expires_at,
        )?;
    } else {
        uow.set_verification_mirror(subscription.place_id, false, None, None)?;
    }
    Ok(())
}

fn subscription_payload(subscription: &Subscription) -> serde_json::Value {
    json!({
        "tier": subscription.tier,
        "status": subscription.status,
        "starts_at": subscription.starts_at.map(format_timestamp),
        "expires_at": subscription.expires_at.map(format_timestamp),
    })
}

impl BusinessService {
    /// The place's subscription row, created as `free/inactive` on first access.
    pub fn ensure_subscription(&self, place: PlaceId) -> ServiceResult<Subscription> {
        let now = self.now();
        self.write("ensure_subscription", |uow| {
            require_place(uow, place)?;
            Ok(uow.ensure_subscription(place, now)?)
        })
    }

    pub fn subscription(&self, place: PlaceId) -> ServiceResult<Option<Subscription>> {
        self.read("subscription", |uow| Ok(uow.subscription(place)?))
    }

    /// What the place may show right now.
    pub fn entitlement(&self, place: PlaceId) -> ServiceResult<Entitlement> {
        let now = self.now();
        let subscription = self.subscription(place)?;
        Ok(subscription
            .map(|sub| Entitlement::project(&sub, now))
            .unwrap_or(Entitlement::NONE))
    }

    /// Owner self-service tier switch.
    ///
    /// A paid tier activates one period immediately. `free` is refused while a
    /// paid subscription is still active; the owner cancels auto-renewal first.
    pub fn owner_change_tier(
        &self,
        user: TgUserId,
        place: PlaceId,
        tier: Tier,
    ) -> ServiceResult<Subscription> {
        let now = self.now();
        self.write("owner_change_tier", |uow| {
            let place = require_place(uow, place)?;
            require_approved_owner(
                uow,
                user,
                place.id,
                "You can only change the plan of your own approved businesses.",
            )?;
            let current = uow.ensure_subscription(place.id, now)?;

            let updated = if tier.is_paid() {
                activate_in(uow, &place, tier, 1, now)?
            } else {
                let active_paid = current.status == SubscriptionStatus::Active
                    && current.tier.is_paid()
                    && !current.is_expired_at(now);
                if active_paid {
                    return Err(ServiceError::validation(
                        ValidationCode::FreeDowngradeBlocked,
                        "Cancel auto-renewal first; the paid plan stays until it expires.",
                    ));
                }
                set_free_in(uow, place.id, now)?
            };

            audit(
                uow,
                place.id,
                Some(user),
                AuditAction::SubscriptionTierChanged,
                &subscription_payload(&updated),
                now,
            )?;
            Ok(updated)
        })
    }

    /// Switch off auto-renewal. Tier and `expires_at` are kept; the sweep
    /// demotes the row once it expires.
    pub fn cancel_auto_renew(&self, user: TgUserId, place: PlaceId) -> ServiceResult<Subscription> {
        let now = self.now();
        self.write("cancel_auto_renew", |uow| {
            let place = require_place(uow, place)?;
            require_approved_owner(
                uow,
                user,
                place.id,
                "You can only manage the plan of your own approved businesses.",
            )?;
            uow.ensure_subscription(place.id, now)?;
            if !uow.mark_canceled(place.id, now)? {
                return Err(ServiceError::validation(
                    ValidationCode::InvalidState,
                    "There is no active paid plan to cancel.",
                ));
            }
            let subscription = uow.ensure_subscription(place.id, now)?;
            sync_mirror(uow, &subscription)?;
            audit(
                uow,
                place.id,
                Some(user),
                AuditAction::SubscriptionCanceled,
                &subscription_payload(&subscription),
                now,
            )?;
            Ok(subscription)
        })
    }

    /// Admin override: `free` resets the row, a paid tier activates `months`
    /// periods (clamped to `1..=12`). Partner exclusivity applies as for payments.
    pub fn admin_set_subscription_tier(
        &self,
        actor: TgUserId,
        place: PlaceId,
        tier: Tier,
        months: u32,
    ) -> ServiceResult<Subscription> {
        let cap = self.access.require_admin(actor)?;
        let months = months.clamp(1, 12);
        let now = self.now();
        self.write("admin_set_subscription_tier", |uow| {
            let place = require_place(uow, place)?;
            let updated = if tier.is_paid() {
                activate_in(uow, &place, tier, months, now)?
            } else {
                set_free_in(uow, place.id, now)?
            };
            let mut payload = subscription_payload(&updated);
            payload["months"] = json!(if tier.is_paid() { Some(months) } else { None });
            audit(
                uow,
                place.id,
                Some(cap.actor()),
                AuditAction::AdminSubscriptionSet,
                &payload,
                now,
            )?;
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, admin};
    use chrono::Duration;

    #[test]
    fn activation_mirrors_onto_place() {
        let fx = Fixture::new();
        let place = fx.approved_place("Plumbing", "Pipes", 10);

        let sub = fx
            .service
            .admin_set_subscription_tier(admin(), place, Tier::Pro, 2)
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expires_at, Some(fx.now() + Duration::days(60)));

        let row = fx.service.place(place).unwrap();
        assert!(row.is_verified);
        assert_eq!(row.verified_tier, Some(Tier::Pro));
        assert_eq!(row.verified_until, sub.expires_at);
    }

    #[test]
    fn months_are_clamped() {
        let fx = Fixture::new();
        let place = fx.approved_place("Plumbing", "Pipes", 10);
        let sub = fx
            .service
            .admin_set_subscription_tier(admin(), place, Tier::Light, 40)
            .unwrap();
        assert_eq!(sub.expires_at, Some(fx.now() + Duration::days(360)));
        let sub = fx
            .service
            .admin_set_subscription_tier(admin(), place, Tier::Light, 0)
            .unwrap();
        assert_eq!(sub.expires_at, Some(fx.now() + Duration::days(30)));
    }

    #[test]
    fn owner_cannot_drop_to_free_while_active() {
        let fx = Fixture::new();
        let place = fx.approved_place("Plumbing", "Pipes", 10);
        let owner = TgUserId::new(10);

        fx.service
            .owner_change_tier(owner, place, Tier::Light)
            .unwrap();
        let err = fx
            .service
            .owner_change_tier(owner, place, Tier::Free)
            .unwrap_err();
        assert_eq!(
            err.validation_code(),
            Some(ValidationCode::FreeDowngradeBlocked)
        );

        // Admins may force free at any time.
        let sub = fx
            .service
            .admin_set_subscription_tier(admin(), place, Tier::Free, 1)
            .unwrap();
        assert_eq!(sub.tier, Tier::Free);
        assert_eq!(sub.status, SubscriptionStatus::Inactive);
        assert!(!fx.service.place(place).unwrap().is_verified);
    }

    #[test]
    fn cancel_keeps_access_until_expiry() {
        let fx = Fixture::new();
        let place = fx.approved_place("Plumbing", "Pipes", 10);
        let owner = TgUserId::new(10);
        fx.service.owner_change_tier(owner, place, Tier::Pro).unwrap();

        let sub = fx.service.cancel_auto_renew(owner, place).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert_eq!(sub.tier, Tier::Pro);

        let ent = fx.service.entitlement(place).unwrap();
        assert_eq!(ent.effective_tier, Tier::Pro);
        assert!(ent.renewal_canceled);
        assert!(!fx.service.place(place).unwrap().is_verified);

        // Once canceled, dropping to free is the owner's call.
        let free = fx.service.owner_change_tier(owner, place, Tier::Free).unwrap();
        assert_eq!(free.tier, Tier::Free);

        let err = fx.service.cancel_auto_renew(owner, place).unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::InvalidState));
    }

    #[test]
    fn non_owner_cannot_change_tier() {
        let fx = Fixture::new();
        let place = fx.approved_place("Plumbing", "Pipes", 10);
        let err = fx
            .service
            .owner_change_tier(TgUserId::new(99), place, Tier::Light)
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccessDenied(_)));
    }

    #[test]
    fn non_admin_cannot_override() {
        let fx = Fixture::new();
        let place = fx.approved_place("Plumbing", "Pipes", 10);
        let err = fx
            .service
            .admin_set_subscription_tier(TgUserId::new(10), place, Tier::Partner, 1)
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccessDenied(_)));
    }

    #[test]
    fn partner_slot_is_exclusive_per_category() {
        let fx = Fixture::new();
        let first = fx.approved_place("Plumbing", "Pipes", 10);
        let second = fx.approved_place("Plumbing", "Drains", 11);
        let elsewhere = fx.approved_place("Cleaning", "Shine", 12);

        fx.service
            .admin_set_subscription_tier(admin(), first, Tier::Partner, 1)
            .unwrap();
        let before = fx.service.subscription(first).unwrap();

        let admin_err = fx
            .service
            .admin_set_subscription_tier(admin(), second, Tier::Partner, 1)
            .unwrap_err();
        let owner_err = fx
            .service
            .owner_change_tier(TgUserId::new(11), second, Tier::Partner)
            .unwrap_err();
        assert_eq!(admin_err.validation_code(), Some(ValidationCode::PartnerSlotTaken));
        assert_eq!(owner_err.validation_code(), Some(ValidationCode::PartnerSlotTaken));
        assert_eq!(fx.service.subscription(first).unwrap(), before);
        assert_eq!(
            fx.service.subscription(second).unwrap().map(|s| s.tier),
            Some(Tier::Free)
        );

        fx.service
            .admin_set_subscription_tier(admin(), elsewhere, Tier::Partner, 1)
            .unwrap();
        // Re-activating the holder itself is allowed.
        fx.service
            .admin_set_subscription_tier(admin(), first, Tier::Partner, 3)
            .unwrap();
    }

    #[test]
    fn lapsed_partner_gives_up_the_slot() {
        let fx = Fixture::new();
        let holder = fx.approved_place("Plumbing", "Pipes", 10);
        let claimant = fx.approved_place("Plumbing", "Drains", 11);
        fx.service
            .admin_set_subscription_tier(admin(), holder, Tier::Partner, 1)
            .unwrap();

        // Unswept but past expiry: still `active` in the table.
        fx.clock.advance(Duration::days(31));
        assert_eq!(
            fx.service.subscription(holder).unwrap().map(|s| s.status),
            Some(SubscriptionStatus::Active)
        );

        fx.service
            .owner_change_tier(TgUserId::new(11), claimant, Tier::Partner)
            .unwrap();

        let released = fx.service.subscription(holder).unwrap().unwrap();
        assert_eq!(released.status, SubscriptionStatus::PastDue);
        assert_eq!(released.tier, Tier::Partner);
        assert!(!fx.service.place(holder).unwrap().is_verified);
        let audits = fx
            .service
            .store()
            .read("test_audit", |uow| {
                uow.audit_entries_with_action(AuditAction::SubscriptionExpiredPastDue)
            })
            .unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].place_id, holder);
    }
}
