//! At most one unexpired partner per category, across processes.

use std::sync::{Arc, Barrier};
use std::thread;

use bizpass_core::ValidationCode;
use bizpass_types::{SubscriptionStatus, TgUserId, Tier};

use crate::common::{ADMIN, Harness, assert_validation};

#[test]
fn second_partner_in_category_is_refused_on_every_path() {
    let h = Harness::new();
    let first = h.approved_place(10, "Dentists", "Smile");
    let second = h.approved_place(11, "Dentists", "Grin");
    let elsewhere = h.approved_place(12, "Bakeries", "Crumb");

    h.service
        .admin_set_subscription_tier(ADMIN, first, Tier::Partner, 1)
        .unwrap();

    assert_validation(
        h.service
            .admin_set_subscription_tier(ADMIN, second, Tier::Partner, 1),
        ValidationCode::PartnerSlotTaken,
    );
    assert_validation(
        h.service
            .owner_change_tier(TgUserId::new(11), second, Tier::Partner),
        ValidationCode::PartnerSlotTaken,
    );

    // Other tiers and other categories are unaffected.
    h.service
        .owner_change_tier(TgUserId::new(11), second, Tier::Pro)
        .unwrap();
    h.service
        .admin_set_subscription_tier(ADMIN, elsewhere, Tier::Partner, 1)
        .unwrap();

    // Renewing the holder is fine.
    h.service
        .admin_set_subscription_tier(ADMIN, first, Tier::Partner, 2)
        .unwrap();
}

#[test]
fn expired_partner_is_released_before_the_sweep_runs() {
    let h = Harness::new();
    let first = h.approved_place(10, "Dentists", "Smile");
    let second = h.approved_place(11, "Dentists", "Grin");
    h.service
        .admin_set_subscription_tier(ADMIN, first, Tier::Partner, 1)
        .unwrap();

    h.days(31);
    let sub = h
        .service
        .admin_set_subscription_tier(ADMIN, second, Tier::Partner, 1)
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);

    // The lapsed holder was moved to past_due in the same transaction.
    let previous = h.service.subscription(first).unwrap().unwrap();
    assert_eq!(previous.status, SubscriptionStatus::PastDue);
    assert_eq!(previous.tier, Tier::Partner);
    assert!(!h.service.place(first).unwrap().is_verified);
    assert!(
        h.audit_actions(first)
            .contains(&"subscription_expired_past_due".to_string())
    );

    // The sweep finds nothing left to do for the old holder.
    let stats = h.service.reconcile_subscriptions(Some(3)).unwrap();
    assert_eq!(stats.active_to_past_due, 0);
}

#[test]
fn concurrent_partner_activations_admit_one() {
    const CONTENDERS: usize = 6;

    let h = Harness::new();
    let places: Vec<_> = (0..CONTENDERS)
        .map(|i| h.approved_place(20 + i as i64, "Lawyers", &format!("Firm {i}")))
        .collect();

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let handles: Vec<_> = places
        .iter()
        .map(|&place| {
            let service = h.second_process();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.admin_set_subscription_tier(ADMIN, place, Tier::Partner, 1)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "results: {results:?}");
    for result in results.iter().filter(|r| r.is_err()) {
        assert_eq!(
            result.as_ref().unwrap_err().validation_code(),
            Some(ValidationCode::PartnerSlotTaken)
        );
    }

    let active_partners = places
        .iter()
        .filter(|&&place| {
            let sub = h.service.subscription(place).unwrap().unwrap();
            sub.tier == Tier::Partner && sub.status == SubscriptionStatus::Active
        })
        .count();
    assert_eq!(active_partners, 1);
}
