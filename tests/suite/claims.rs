//! Claim tokens: single use under contention, expiry and rotation.

use std::sync::{Arc, Barrier};
use std::thread;

use bizpass_core::ValidationCode;
use bizpass_types::{ClaimTokenStatus, OwnerStatus, TgUserId};

use crate::common::{ADMIN, Harness, assert_validation};

#[test]
fn concurrent_claims_of_one_token_admit_one() {
    const CLAIMANTS: usize = 8;

    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let token = h
        .service
        .get_or_create_claim_token(ADMIN, place)
        .unwrap()
        .token;

    let barrier = Arc::new(Barrier::new(CLAIMANTS));
    let handles: Vec<_> = (0..CLAIMANTS)
        .map(|i| {
            let service = h.second_process();
            let barrier = Arc::clone(&barrier);
            let secret = token.token.clone();
            thread::spawn(move || {
                barrier.wait();
                service.claim_business_by_token(TgUserId::new(100 + i as i64), &secret)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "results: {results:?}");
    for result in results.iter().filter(|r| r.is_err()) {
        let code = result.as_ref().unwrap_err().validation_code();
        assert!(
            matches!(
                code,
                Some(ValidationCode::TokenInactive | ValidationCode::PendingRequestExists)
            ),
            "unexpected {code:?}"
        );
    }

    let history = h.service.recent_claim_tokens(ADMIN, place).unwrap();
    assert_eq!(history[0].status, ClaimTokenStatus::Used);
    assert_eq!(history[0].attempts_left, token.attempts_left - 1);
}

#[test]
fn claim_files_a_pending_request() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let token = h.service.rotate_claim_token(ADMIN, place).unwrap();

    // Input is trimmed and case-folded.
    let messy = format!("  {}  ", token.token.to_ascii_lowercase());
    let request = h
        .service
        .claim_business_by_token(TgUserId::new(42), &messy)
        .unwrap();

    let pending = h.service.pending_owner_requests(ADMIN).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, request);
    assert_eq!(pending[0].status, OwnerStatus::Pending);
    assert_eq!(pending[0].tg_user_id, TgUserId::new(42));
    assert!(
        h.audit_actions(place)
            .contains(&"owner_claim_requested".to_string())
    );
}

#[test]
fn bad_codes_are_reported_precisely() {
    let h = Harness::new();
    let place = h.approved_place(10, "Cafes", "Blue Door");
    let user = TgUserId::new(42);

    assert_validation(
        h.service.claim_business_by_token(user, "   "),
        ValidationCode::TokenMissing,
    );
    assert_validation(
        h.service.claim_business_by_token(user, "NOSUCHCODE"),
        ValidationCode::TokenNotFound,
    );

    // The approved owner cannot claim their own place again.
    let token = h.service.rotate_claim_token(ADMIN, place).unwrap();
    assert_validation(
        h.service.claim_business_by_token(TgUserId::new(10), &token.token),
        ValidationCode::AlreadyOwner,
    );

    // Rotation revokes the previous secret.
    let fresh = h.service.rotate_claim_token(ADMIN, place).unwrap();
    assert_validation(
        h.service.claim_business_by_token(user, &token.token),
        ValidationCode::TokenInactive,
    );

    // Past its TTL the token is reported expired and left untouched.
    h.days(4);
    assert_validation(
        h.service.claim_business_by_token(user, &fresh.token),
        ValidationCode::TokenExpired,
    );
    let history = h.service.recent_claim_tokens(ADMIN, place).unwrap();
    assert_eq!(history[0].id, fresh.id);
    assert_eq!(history[0].status, ClaimTokenStatus::Active);
    assert_eq!(history[0].attempts_left, fresh.attempts_left);

    // get_or_create replaces an expired token.
    let issued = h.service.get_or_create_claim_token(ADMIN, place).unwrap();
    assert!(issued.created);
    assert_ne!(issued.token.id, fresh.id);
}

#[test]
fn bulk_rotation_touches_every_place() {
    let h = Harness::new();
    let places = [
        h.approved_place(10, "Cafes", "Blue Door"),
        h.approved_place(11, "Cafes", "Red Door"),
        h.register(12, "Bakeries", "Crumb"),
    ];
    let before = h.service.rotate_claim_token(ADMIN, places[0]).unwrap();

    let stats = h.service.bulk_rotate_claim_tokens(ADMIN).unwrap();
    assert_eq!(stats.total_places, 3);
    assert_eq!(stats.rotated, 3);
    assert_eq!(stats.failed, 0);

    for place in places {
        let bulk = h
            .audit_actions(place)
            .into_iter()
            .filter(|a| a == "claim_token_rotated_admin_ui_bulk")
            .count();
        assert_eq!(bulk, 1, "place {place}");
    }
    assert_validation(
        h.service
            .claim_business_by_token(TgUserId::new(50), &before.token),
        ValidationCode::TokenInactive,
    );
    assert!(h.service.bulk_rotate_claim_tokens(TgUserId::new(10)).is_err());
}
