//! The service façade every inbound event goes through.

use std::sync::Arc;

use bizpass_config::{BizpassConfig, TokenSettings};
use bizpass_payments::PaymentProvider;
use bizpass_store::{Store, UnitOfWork};
use bizpass_types::{
    AuditAction, Clock, Place, PlaceId, STARS_CURRENCY, TgUserId, Timestamp,
};
use serde_json::Value;

use crate::errors::Missing;
use crate::{AccessPolicy, AdminEvent, AdminNotifier, NoopNotifier, ServiceError, ServiceResult};

/// Tunables resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub tokens: TokenSettings,
    pub grace_days: u32,
    pub currency: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            tokens: TokenSettings::default(),
            grace_days: bizpass_config::DEFAULT_GRACE_DAYS,
            currency: STARS_CURRENCY.to_string(),
        }
    }
}

impl From<&BizpassConfig> for ServiceSettings {
    fn from(config: &BizpassConfig) -> Self {
        Self {
            tokens: config.claim_tokens(),
            grace_days: config.grace_days(),
            currency: config.currency(),
        }
    }
}

/// Entry point for owner actions, admin commands, payment callbacks and the
/// reconciliation sweep.
///
/// Each mutating call runs as exactly one unit of work on the [`Store`]. Calls
/// into the payment provider and the admin notifier happen strictly outside
/// that unit of work.
pub struct BusinessService {
    pub(crate) store: Arc<Store>,
    pub(crate) provider: Arc<dyn PaymentProvider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) access: Arc<AccessPolicy>,
    pub(crate) notifier: Arc<dyn AdminNotifier>,
    pub(crate) settings: ServiceSettings,
}

impl BusinessService {
    pub fn new(
        store: Arc<Store>,
        provider: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
        access: Arc<AccessPolicy>,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            access,
            notifier: Arc::new(NoopNotifier),
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AdminNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// One immediate-mode unit of work with the service error type.
    pub(crate) fn write<T>(
        &self,
        label: &'static str,
        op: impl FnMut(&UnitOfWork<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        self.store.write(label, op)
    }

    pub(crate) fn read<T>(
        &self,
        label: &'static str,
        op: impl FnMut(&UnitOfWork<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        self.store.read(label, op)
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn notify(&self, event: &AdminEvent) {
        self.notifier.notify(event);
    }

    pub fn place(&self, place: PlaceId) -> ServiceResult<Place> {
        self.read("place", |uow| require_place(uow, place))
    }
}

pub(crate) fn require_place(uow: &UnitOfWork<'_>, place: PlaceId) -> ServiceResult<Place> {
    uow.place(place)?
        .ok_or(ServiceError::NotFound(Missing::Place(place)))
}

pub(crate) fn require_approved_owner(
    uow: &UnitOfWork<'_>,
    user: TgUserId,
    place: PlaceId,
    message: &'static str,
) -> ServiceResult<()> {
    if uow.is_approved_owner(user, place)? {
        Ok(())
    } else {
        Err(ServiceError::AccessDenied(message))
    }
}

pub(crate) fn audit(
    uow: &UnitOfWork<'_>,
    place: PlaceId,
    actor: Option<TgUserId>,
    action: AuditAction,
    payload: &Value,
    now: Timestamp,
) -> ServiceResult<()> {
    uow.append_audit(place, actor, action, payload, now)?;
    Ok(())
}
