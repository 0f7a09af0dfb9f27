//! Owner moderation, tier changes and the expiry sweep end to end.

use std::sync::Arc;
use std::time::Duration;

use bizpass_core::{NewBusiness, ValidationCode, run_reconcile_loop};
use bizpass_types::{SubscriptionStatus, TgUserId, Tier};
use tokio::sync::watch;

use crate::common::{ADMIN, Harness, assert_validation};

#[test]
fn resolved_requests_are_terminal() {
    let h = Harness::new();
    let registration = h
        .service
        .register_new_business(TgUserId::new(10), NewBusiness::new("Cafes", "Blue Door"))
        .unwrap();
    let draft = h.service.place(registration.place).unwrap();
    assert!(!draft.is_published);

    h.service
        .approve_owner_request(ADMIN, registration.owner.id)
        .unwrap();
    let published = h.service.place(registration.place).unwrap();
    assert!(published.is_published);
    assert!(published.business_enabled);

    assert_validation(
        h.service.approve_owner_request(ADMIN, registration.owner.id),
        ValidationCode::InvalidState,
    );
    assert_validation(
        h.service.reject_owner_request(ADMIN, registration.owner.id),
        ValidationCode::InvalidState,
    );
}

#[test]
fn rejecting_the_only_request_disables_the_place() {
    let h = Harness::new();
    let registration = h
        .service
        .register_new_business(TgUserId::new(10), NewBusiness::new("Cafes", "Blue Door"))
        .unwrap();
    h.service
        .reject_owner_request(ADMIN, registration.owner.id)
        .unwrap();
    let place = h.service.place(registration.place).unwrap();
    assert!(!place.business_enabled);
    assert!(!place.is_published);
}

#[test]
fn rejecting_a_claim_keeps_an_owned_place_live() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let request = h
        .service
        .create_owner_request(TgUserId::new(11), place)
        .unwrap();
    h.service.reject_owner_request(ADMIN, request.id).unwrap();

    let listed = h.service.place(place).unwrap();
    assert!(listed.business_enabled);
    assert!(listed.is_published);
}

#[test]
fn paid_plan_walks_from_active_to_free() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    h.service
        .admin_set_subscription_tier(ADMIN, place, Tier::Light, 1)
        .unwrap();

    // Owners cannot drop a live paid plan straight to free.
    assert_validation(
        h.service.owner_change_tier(TgUserId::new(10), place, Tier::Free),
        ValidationCode::FreeDowngradeBlocked,
    );

    // The sweep may run in another process.
    let sweeper = h.second_process();

    h.days(31);
    let stats = sweeper.reconcile_subscriptions(Some(3)).unwrap();
    assert_eq!(stats.active_to_past_due, 1);
    let sub = h.service.subscription(place).unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PastDue);
    assert_eq!(sub.tier, Tier::Light);
    assert!(!h.service.place(place).unwrap().is_verified);
    assert!(!h.service.entitlement(place).unwrap().has_paid_access());

    assert_eq!(sweeper.reconcile_subscriptions(Some(3)).unwrap().total_changed(), 0);

    h.days(3);
    let stats = sweeper.reconcile_subscriptions(Some(3)).unwrap();
    assert_eq!(stats.past_due_to_free, 1);
    let sub = h.service.subscription(place).unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Inactive);
    assert_eq!(sub.tier, Tier::Free);
    assert_eq!(sub.expires_at, None);

    assert_eq!(sweeper.reconcile_subscriptions(Some(3)).unwrap().total_changed(), 0);
}

#[test]
fn canceled_plan_keeps_features_until_expiry() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let owner = TgUserId::new(10);
    h.service.owner_change_tier(owner, place, Tier::Pro).unwrap();
    h.service.cancel_auto_renew(owner, place).unwrap();

    let entitlement = h.service.entitlement(place).unwrap();
    assert_eq!(entitlement.effective_tier, Tier::Pro);
    assert!(entitlement.renewal_canceled);
    assert!(!entitlement.verified);
    assert!(!h.service.place(place).unwrap().is_verified);

    // Once canceled, switching to free is allowed.
    h.service.owner_change_tier(owner, place, Tier::Free).unwrap();
    assert_eq!(
        h.service.subscription(place).unwrap().unwrap().tier,
        Tier::Free
    );
    assert_validation(
        h.service.cancel_auto_renew(owner, place),
        ValidationCode::InvalidState,
    );
}

#[test]
fn profile_edits_need_an_approved_owner() {
    use bizpass_types::PlaceField;

    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    h.service
        .update_place_field(TgUserId::new(10), place, PlaceField::Address, "  1 Main St ")
        .unwrap();
    assert_eq!(h.service.place(place).unwrap().address, "1 Main St");

    assert!(
        h.service
            .update_place_field(TgUserId::new(11), place, PlaceField::Address, "x")
            .is_err()
    );
    assert_validation(
        h.service
            .update_place_field(TgUserId::new(10), place, PlaceField::Name, "   "),
        ValidationCode::InvalidInput,
    );

    let businesses = h.service.list_user_businesses(TgUserId::new(10)).unwrap();
    assert_eq!(businesses.len(), 1);
    assert_eq!(businesses[0].place.id, place);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconcile_loop_stops_on_shutdown() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    h.service
        .admin_set_subscription_tier(ADMIN, place, Tier::Partner, 1)
        .unwrap();
    h.days(31);

    let sweeper = Arc::new(h.second_process());
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(run_reconcile_loop(sweeper, Duration::from_secs(60), rx));

    let mut status = SubscriptionStatus::Active;
    for _ in 0..300 {
        status = h.service.subscription(place).unwrap().unwrap().status;
        if status == SubscriptionStatus::PastDue {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, SubscriptionStatus::PastDue);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}
