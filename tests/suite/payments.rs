//! Payment ledger: idempotency, invoice matching and refunds.

use bizpass_core::{MockResult, ValidationCode};
use bizpass_types::{
    AuditAction, PaymentEventType, PaymentSource, STARS_CURRENCY, SubscriptionStatus, TgUserId,
    Tier, period_end,
};

use crate::common::{ADMIN, Harness, assert_validation};

const OWNER: TgUserId = TgUserId::new(10);

#[test]
fn replayed_success_is_a_duplicate_and_extends_nothing() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");

    let first = h
        .service
        .apply_mock_payment_result(OWNER, place, Tier::Light, "mock_abc", MockResult::Success)
        .unwrap();
    assert!(first.applied);
    let expires = h.service.subscription(place).unwrap().unwrap().expires_at;
    assert_eq!(expires, Some(period_end(h.clock_now(), 1)));

    h.days(2);
    let replay = h
        .service
        .apply_mock_payment_result(OWNER, place, Tier::Light, "mock_abc", MockResult::Success)
        .unwrap();
    assert!(replay.duplicate);
    assert!(!replay.applied);
    assert_eq!(replay.event_id, first.event_id);

    let sub = h.service.subscription(place).unwrap().unwrap();
    assert_eq!(sub.expires_at, expires);
    let succeeded = h
        .service
        .payment_events_for(place)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == PaymentEventType::PaymentSucceeded)
        .count();
    assert_eq!(succeeded, 1);
}

#[test]
fn canceled_and_failed_results_only_touch_the_ledger() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");

    h.service
        .apply_mock_payment_result(OWNER, place, Tier::Pro, "mock_1", MockResult::Cancel)
        .unwrap();
    h.service
        .apply_mock_payment_result(OWNER, place, Tier::Pro, "mock_2", MockResult::Fail)
        .unwrap();

    let sub = h.service.subscription(place).unwrap().unwrap();
    assert_eq!(sub.tier, Tier::Free);
    assert!(!h.service.place(place).unwrap().is_verified);

    let actions = h.audit_actions(place);
    assert!(actions.contains(&"payment_canceled".to_string()));
    assert!(actions.contains(&"payment_failed".to_string()));
}

#[test]
fn stars_checkout_flow_activates_once() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let stars = h.stars_process();

    let intent = stars
        .create_payment_intent(OWNER, place, Tier::Pro, PaymentSource::Plans)
        .unwrap();
    let payload = intent.invoice_payload.clone().unwrap();
    assert_eq!(intent.amount, 2500);

    let pre = stars
        .validate_pre_checkout(OWNER, &payload, 2500, STARS_CURRENCY, "q-1")
        .unwrap();
    assert!(pre.applied);
    let pre_replay = stars
        .validate_pre_checkout(OWNER, &payload, 2500, STARS_CURRENCY, "q-1")
        .unwrap();
    assert!(pre_replay.duplicate);

    let paid = stars
        .apply_successful_payment(OWNER, &payload, 2500, STARS_CURRENCY, "charge-77")
        .unwrap();
    assert!(paid.applied);
    let again = stars
        .apply_successful_payment(OWNER, &payload, 2500, STARS_CURRENCY, "charge-77")
        .unwrap();
    assert!(again.duplicate);

    let sub = h.service.subscription(place).unwrap().unwrap();
    assert_eq!(sub.tier, Tier::Pro);
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.expires_at, Some(period_end(h.clock_now(), 1)));
    let listed = h.service.place(place).unwrap();
    assert!(listed.is_verified);
    assert_eq!(listed.verified_tier, Some(Tier::Pro));

    let types: Vec<_> = h
        .service
        .payment_events_for(place)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            PaymentEventType::PaymentSucceeded,
            PaymentEventType::PreCheckoutOk,
            PaymentEventType::InvoiceCreated,
        ]
    );
}

#[test]
fn tampered_checkout_is_rejected() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let stars = h.stars_process();
    let intent = stars
        .create_payment_intent(OWNER, place, Tier::Light, PaymentSource::Plans)
        .unwrap();
    let payload = intent.invoice_payload.unwrap();

    assert_validation(
        stars.validate_pre_checkout(TgUserId::new(99), &payload, 1000, STARS_CURRENCY, "q"),
        ValidationCode::IntentMismatch,
    );
    assert_validation(
        stars.apply_successful_payment(OWNER, &payload, 1, STARS_CURRENCY, "charge-1"),
        ValidationCode::IntentMismatch,
    );
    assert_validation(
        stars.apply_successful_payment(OWNER, "garbage", 1000, STARS_CURRENCY, "charge-1"),
        ValidationCode::PayloadInvalid,
    );
    assert_eq!(
        h.service.subscription(place).unwrap().unwrap().tier,
        Tier::Free
    );
}

#[test]
fn admin_refund_resets_but_provider_refund_only_records() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let stars = h.stars_process();
    let payload = stars
        .create_payment_intent(OWNER, place, Tier::Partner, PaymentSource::Plans)
        .unwrap()
        .invoice_payload
        .unwrap();
    let paid = stars
        .apply_successful_payment(OWNER, &payload, 5000, STARS_CURRENCY, "charge-9")
        .unwrap();

    // A provider-reported refund is recorded and audited, access stays.
    let provider_refund = stars
        .apply_terminal_event("refund", &payload, Some("refund-9"), Some("chargeback"))
        .unwrap();
    assert!(provider_refund.applied);
    assert_eq!(
        h.service.subscription(place).unwrap().unwrap().tier,
        Tier::Partner
    );

    let refund = h
        .service
        .admin_mark_payment_refund(ADMIN, paid.event_id.unwrap(), Some("duplicate charge"))
        .unwrap();
    assert!(refund.applied);
    let sub = h.service.subscription(place).unwrap().unwrap();
    assert_eq!(sub.tier, Tier::Free);
    assert_eq!(sub.status, SubscriptionStatus::Inactive);
    assert!(!h.service.place(place).unwrap().is_verified);

    let second = h
        .service
        .admin_mark_payment_refund(ADMIN, paid.event_id.unwrap(), None)
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(second.event_id, refund.event_id);

    let refunds = h
        .service
        .store()
        .read("test_audit", |uow| {
            uow.audit_entries_with_action(AuditAction::AdminPaymentRefund)
        })
        .unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].payload_json["refund_reason"], "duplicate charge");
}

#[test]
fn only_successful_payments_are_refundable() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let failed = h
        .service
        .apply_mock_payment_result(OWNER, place, Tier::Light, "mock_f", MockResult::Fail)
        .unwrap();

    assert_validation(
        h.service
            .admin_mark_payment_refund(ADMIN, failed.event_id.unwrap(), None),
        ValidationCode::NotRefundable,
    );
    assert!(
        h.service
            .admin_mark_payment_refund(OWNER, failed.event_id.unwrap(), None)
            .is_err()
    );
}

#[test]
fn mock_results_need_the_mock_provider() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let stars = h.stars_process();
    assert_validation(
        stars.apply_mock_payment_result(OWNER, place, Tier::Pro, "mock_x", MockResult::Success),
        ValidationCode::InvalidState,
    );
}

#[test]
fn failed_activation_leaves_no_ledger_row() {
    let h = Harness::new();
    let first = h.approved_place(10, "Cafes", "Blue Door");
    let second = h.approved_place(11, "Cafes", "Red Door");
    h.service
        .apply_mock_payment_result(OWNER, first, Tier::Partner, "mock_p1", MockResult::Success)
        .unwrap();

    assert_validation(
        h.service.apply_mock_payment_result(
            TgUserId::new(11),
            second,
            Tier::Partner,
            "mock_p2",
            MockResult::Success,
        ),
        ValidationCode::PartnerSlotTaken,
    );
    assert!(h.service.payment_events_for(second).unwrap().is_empty());
}
