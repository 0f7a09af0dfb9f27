//! Admin notifications fire only for committed changes.

use bizpass_core::{AdminEvent, NewBusiness, ValidationCode};
use bizpass_types::TgUserId;

use crate::common::{ADMIN, Harness, assert_validation};

#[test]
fn each_committed_moderation_step_notifies_once() {
    let h = Harness::new();
    let owner = TgUserId::new(10);
    let registration = h
        .service
        .register_new_business(owner, NewBusiness::new("Cafes", "Blue Door"))
        .unwrap();
    h.service
        .approve_owner_request(ADMIN, registration.owner.id)
        .unwrap();

    let token = h
        .service
        .rotate_claim_token(ADMIN, registration.place)
        .unwrap();
    let claim = h
        .service
        .claim_business_by_token(TgUserId::new(11), &token.token)
        .unwrap();
    h.service.reject_owner_request(ADMIN, claim).unwrap();

    assert_eq!(
        h.notifier.kinds(),
        vec![
            "owner_request_created",
            "owner_request_approved",
            "owner_claim_requested",
            "owner_request_rejected",
        ]
    );
    assert_eq!(
        h.notifier.events()[0],
        AdminEvent::OwnerRequestCreated {
            request: registration.owner.id,
            place: registration.place,
            place_name: "Blue Door".to_string(),
            owner,
        }
    );
}

#[test]
fn failed_operations_do_not_notify() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let before = h.notifier.events().len();

    assert_validation(
        h.service
            .register_new_business(TgUserId::new(12), NewBusiness::new("", "Nameless")),
        ValidationCode::InvalidInput,
    );
    assert_validation(
        h.service.create_owner_request(TgUserId::new(10), place),
        ValidationCode::AlreadyOwner,
    );
    let pending = h
        .service
        .create_owner_request(TgUserId::new(11), place)
        .unwrap();
    assert_validation(
        h.service.create_owner_request(TgUserId::new(12), place),
        ValidationCode::PendingRequestExists,
    );
    assert!(h.service.approve_owner_request(TgUserId::new(10), pending.id).is_err());

    let new_kinds: Vec<_> = h.notifier.kinds().split_off(before);
    assert_eq!(new_kinds, vec!["owner_request_created"]);
}
