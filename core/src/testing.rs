//! Shared fixtures for unit tests.

use std::path::Path;
use std::sync::Arc;

use bizpass_payments::{MockPaymentProvider, PaymentProvider, TelegramStarsProvider};
use bizpass_store::{Store, StoreOptions};
use bizpass_types::{FixedClock, PlaceId, TgUserId, Timestamp};
use chrono::{TimeZone, Utc};

use crate::{AccessPolicy, BusinessService, NewBusiness};

pub(crate) const ADMIN: i64 = 1;

pub(crate) fn admin() -> TgUserId {
    TgUserId::new(ADMIN)
}

pub(crate) fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub(crate) struct Fixture {
    pub(crate) clock: Arc<FixedClock>,
    pub(crate) service: BusinessService,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let clock = Arc::new(FixedClock::new(start()));
        let provider = Arc::new(MockPaymentProvider::deterministic(clock.clone()));
        Self::build(clock, provider)
    }

    pub(crate) fn with_stars() -> Self {
        let clock = Arc::new(FixedClock::new(start()));
        let provider = Arc::new(TelegramStarsProvider::new(clock.clone()));
        Self::build(clock, provider)
    }

    /// Fixture on a database file that other connections can open too.
    pub(crate) fn on_disk(path: &Path) -> Self {
        let clock = Arc::new(FixedClock::new(start()));
        let provider = Arc::new(MockPaymentProvider::deterministic(clock.clone()));
        let store = Store::open(path, StoreOptions::default()).unwrap();
        Self::with_store(store, clock, provider)
    }

    fn build(clock: Arc<FixedClock>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self::with_store(Store::open_in_memory().unwrap(), clock, provider)
    }

    fn with_store(store: Store, clock: Arc<FixedClock>, provider: Arc<dyn PaymentProvider>) -> Self {
        let store = Arc::new(store);
        let access = Arc::new(AccessPolicy::new([admin()]));
        let service = BusinessService::new(store, provider, clock.clone(), access);
        Self { clock, service }
    }

    pub(crate) fn now(&self) -> Timestamp {
        use bizpass_types::Clock;
        self.clock.now()
    }

    /// Register a business as `owner` and approve it.
    pub(crate) fn approved_place(&self, category: &str, name: &str, owner: i64) -> PlaceId {
        let registration = self
            .service
            .register_new_business(TgUserId::new(owner), NewBusiness::new(category, name))
            .unwrap();
        self.service
            .approve_owner_request(admin(), registration.owner.id)
            .unwrap();
        registration.place
    }
}
