//! Shared test utilities and fixtures
//!
//! Every harness owns a temporary on-disk database so several services (one
//! per simulated process) can contend for it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bizpass_core::{
    AccessPolicy, AdminEvent, AdminNotifier, BusinessService, NewBusiness, ServiceError,
    ValidationCode,
};
use bizpass_payments::{MockPaymentProvider, PaymentProvider, TelegramStarsProvider};
use bizpass_store::{Store, StoreOptions};
use bizpass_types::{FixedClock, PlaceId, TgUserId, Timestamp};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

pub const ADMIN: TgUserId = TgUserId::new(1);

pub fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Notifier that keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<AdminEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<AdminEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(AdminEvent::kind).collect()
    }
}

impl AdminNotifier for RecordingNotifier {
    fn notify(&self, event: &AdminEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub struct Harness {
    _dir: TempDir,
    pub db_path: PathBuf,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: BusinessService,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("bizpass.db");
        let clock = Arc::new(FixedClock::new(start()));
        let notifier = Arc::new(RecordingNotifier::default());
        let provider = Arc::new(MockPaymentProvider::deterministic(clock.clone()));
        let service = service_on(&db_path, clock.clone(), provider)
            .with_notifier(notifier.clone());
        Self {
            _dir: dir,
            db_path,
            clock,
            notifier,
            service,
        }
    }

    /// Another service on the same database file, like a second process.
    pub fn second_process(&self) -> BusinessService {
        let provider = Arc::new(MockPaymentProvider::new(self.clock.clone()));
        service_on(&self.db_path, self.clock.clone(), provider)
    }

    /// A service on the same database that issues Telegram Stars invoices.
    pub fn stars_process(&self) -> BusinessService {
        let provider = Arc::new(TelegramStarsProvider::new(self.clock.clone()));
        service_on(&self.db_path, self.clock.clone(), provider)
    }

    pub fn register(&self, owner: i64, category: &str, name: &str) -> PlaceId {
        self.service
            .register_new_business(TgUserId::new(owner), NewBusiness::new(category, name))
            .unwrap()
            .place
    }

    /// Register `name` for `owner` and approve it.
    pub fn approved_place(&self, owner: i64, category: &str, name: &str) -> PlaceId {
        let registration = self
            .service
            .register_new_business(TgUserId::new(owner), NewBusiness::new(category, name))
            .unwrap();
        self.service
            .approve_owner_request(ADMIN, registration.owner.id)
            .unwrap();
        registration.place
    }

    pub fn clock_now(&self) -> Timestamp {
        use bizpass_types::Clock;
        self.clock.now()
    }

    pub fn days(&self, days: i64) {
        self.clock.advance(chrono::Duration::days(days));
    }

    pub fn audit_actions(&self, place: PlaceId) -> Vec<String> {
        self.service
            .store()
            .read("test_audit", |uow| uow.audit_entries_for(place))
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }
}

pub fn service_on(
    db_path: &Path,
    clock: Arc<FixedClock>,
    provider: Arc<dyn PaymentProvider>,
) -> BusinessService {
    let store = Store::open(db_path, StoreOptions::default()).unwrap();
    BusinessService::new(
        Arc::new(store),
        provider,
        clock,
        Arc::new(AccessPolicy::new([ADMIN])),
    )
}

#[track_caller]
pub fn assert_validation<T: std::fmt::Debug>(
    result: Result<T, ServiceError>,
    expected: ValidationCode,
) {
    match result {
        Err(err) => assert_eq!(err.validation_code(), Some(expected), "unexpected error: {err}"),
        Ok(value) => panic!("expected {expected}, got Ok({value:?})"),
    }
}
