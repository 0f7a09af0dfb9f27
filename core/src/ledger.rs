//! Payment event ledger.
//!
//! Every money-moving change goes through [`BusinessService::apply_payment_event`].
//! The `(provider, external_payment_id, event_type)` triple is unique, and an
//! event only has an effect in the unit of work that inserted it, so replayed
//! callbacks are reported as duplicates and never applied twice.
//!
//! A provider `refund` is recorded and audited but leaves the subscription
//! alone. Revoking access for a refunded payment is the separate admin action
//! [`BusinessService::admin_mark_payment_refund`].

use bizpass_payments::{IntentRequest, MockPaymentProvider, PaymentIntent};
use bizpass_store::{NewPaymentEvent, UnitOfWork};
use bizpass_types::{
    AuditAction, InvoicePayload, PaymentEvent, PaymentEventId, PaymentEventType, PaymentSource,
    Place, PlaceId, STARS_CURRENCY, TgUserId, Tier, Timestamp, format_timestamp, monthly_price,
};
use serde_json::json;

use crate::errors::Missing;
use crate::service::{audit, require_approved_owner, require_place};
use crate::subscriptions::{activate_in, ensure_partner_slot_free, set_free_in};
use crate::{BusinessService, ServiceError, ServiceResult, ValidationCode};

const EVENT_LIST_LIMIT: u32 = 50;
const ADMIN_REFUND_PREFIX: &str = "admin-refund";

/// Result of applying one ledger event.
///
/// `duplicate` is a normal outcome: the triple was already recorded and
/// nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub applied: bool,
    pub duplicate: bool,
    pub event_id: Option<PaymentEventId>,
}

/// One inbound payment lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    pub provider: String,
    pub external_payment_id: String,
    pub event_type: PaymentEventType,
    pub place_id: PlaceId,
    pub tier: Tier,
    pub amount: i64,
    pub currency: String,
    pub raw_payload: Option<String>,
    pub actor: Option<TgUserId>,
    /// Periods activated by `payment_succeeded`.
    pub months: u32,
    pub reason: Option<String>,
}

impl LedgerEvent {
    /// Event priced from the plan matrix, one period, Stars currency.
    pub fn new(
        provider: impl Into<String>,
        external_payment_id: impl Into<String>,
        event_type: PaymentEventType,
        place_id: PlaceId,
        tier: Tier,
    ) -> Self {
        Self {
            provider: provider.into(),
            external_payment_id: external_payment_id.into(),
            event_type,
            place_id,
            tier,
            amount: monthly_price(tier).unwrap_or(0),
            currency: STARS_CURRENCY.to_string(),
            raw_payload: None,
            actor: None,
            months: 1,
            reason: None,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: i64, currency: impl Into<String>) -> Self {
        self.amount = amount;
        self.currency = currency.into();
        self
    }

    #[must_use]
    pub fn raw_payload(mut self, raw: impl Into<String>) -> Self {
        self.raw_payload = Some(raw.into());
        self
    }

    #[must_use]
    pub fn actor(mut self, actor: TgUserId) -> Self {
        self.actor = Some(actor);
        self
    }

    #[must_use]
    pub fn months(mut self, months: u32) -> Self {
        self.months = months;
        self
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Outcome reported by the mock provider's test checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockResult {
    Success,
    Cancel,
    Fail,
}

impl MockResult {
    const fn event_type(self) -> PaymentEventType {
        match self {
            MockResult::Success => PaymentEventType::PaymentSucceeded,
            MockResult::Cancel => PaymentEventType::PaymentCanceled,
            MockResult::Fail => PaymentEventType::PaymentFailed,
        }
    }
}

const fn ledger_status(event_type: PaymentEventType) -> &'static str {
    match event_type {
        PaymentEventType::InvoiceCreated => "created",
        PaymentEventType::PreCheckoutOk => "pre_checkout_ok",
        PaymentEventType::PaymentSucceeded => "succeeded",
        PaymentEventType::PaymentCanceled => "canceled",
        PaymentEventType::PaymentFailed => "failed",
        PaymentEventType::Refund => "refunded",
    }
}

fn payload_invalid() -> ServiceError {
    ServiceError::validation(
        ValidationCode::PayloadInvalid,
        "The payment payload could not be read.",
    )
}

fn intent_mismatch(detail: &'static str) -> ServiceError {
    ServiceError::validation(ValidationCode::IntentMismatch, detail)
}

fn decode_payload(raw: &str) -> ServiceResult<InvoicePayload> {
    InvoicePayload::decode(raw).ok_or_else(payload_invalid)
}

fn require_paid(tier: Tier) -> ServiceResult<i64> {
    monthly_price(tier).ok_or_else(|| {
        ServiceError::validation(ValidationCode::NotPaidTier, "This plan cannot be purchased.")
    })
}

/// Insert `event` and apply its effect if the triple is new.
fn apply_in(
    uow: &UnitOfWork<'_>,
    event: &LedgerEvent,
    now: Timestamp,
) -> ServiceResult<PaymentOutcome> {
    let place = require_place(uow, event.place_id)?;
    let row = NewPaymentEvent {
        provider: &event.provider,
        external_payment_id: &event.external_payment_id,
        event_type: event.event_type,
        place_id: place.id,
        tier: event.tier,
        amount: event.amount,
        currency: &event.currency,
        status: ledger_status(event.event_type),
        raw_payload: event.raw_payload.as_deref(),
    };
    let Some(event_id) = uow.insert_payment_event(&row, now)? else {
        let existing = uow.find_payment_event(
            &event.provider,
            &event.external_payment_id,
            event.event_type,
        )?;
        return Ok(PaymentOutcome {
            applied: false,
            duplicate: true,
            event_id: existing.map(|e| e.id),
        });
    };

    let payload = match event.event_type {
        PaymentEventType::PaymentSucceeded => {
            let subscription = activate_in(uow, &place, event.tier, event.months, now)?;
            json!({
                "external_payment_id": event.external_payment_id,
                "provider": event.provider,
                "tier": event.tier,
                "amount": event.amount,
                "currency": event.currency,
                "expires_at": subscription.expires_at.map(format_timestamp),
            })
        }
        PaymentEventType::Refund => json!({
            "external_payment_id": event.external_payment_id,
            "refund_reason": event.reason,
        }),
        _ => json!({
            "external_payment_id": event.external_payment_id,
            "provider": event.provider,
            "tier": event.tier,
            "amount": event.amount,
            "currency": event.currency,
        }),
    };
    audit(
        uow,
        place.id,
        event.actor,
        AuditAction::from(event.event_type),
        &payload,
        now,
    )?;

    Ok(PaymentOutcome {
        applied: true,
        duplicate: false,
        event_id: Some(event_id),
    })
}

impl BusinessService {
    /// Record one payment lifecycle event.
    ///
    /// If `payment_succeeded` cannot activate (for example the partner slot is
    /// taken), nothing is recorded and the error is returned.
    pub fn apply_payment_event(&self, event: &LedgerEvent) -> ServiceResult<PaymentOutcome> {
        if event.external_payment_id.trim().is_empty() {
            return Err(ServiceError::validation(
                ValidationCode::InvalidInput,
                "Payment id is required.",
            ));
        }
        let now = self.now();
        let outcome = self.write("apply_payment_event", |uow| apply_in(uow, event, now))?;
        self.log_outcome(event, outcome);
        Ok(outcome)
    }

    fn log_outcome(&self, event: &LedgerEvent, outcome: PaymentOutcome) {
        if outcome.duplicate {
            tracing::debug!(
                provider = %event.provider,
                external_payment_id = %event.external_payment_id,
                event_type = %event.event_type,
                "Duplicate payment event ignored"
            );
        } else {
            tracing::info!(
                provider = %event.provider,
                external_payment_id = %event.external_payment_id,
                event_type = %event.event_type,
                place_id = %event.place_id,
                tier = %event.tier,
                "Payment event recorded"
            );
        }
    }

    /// Ask the provider for a payment handle and record `invoice_created`.
    ///
    /// The provider is called between two units of work, never inside one.
    pub fn create_payment_intent(
        &self,
        user: TgUserId,
        place: PlaceId,
        tier: Tier,
        source: PaymentSource,
    ) -> ServiceResult<PaymentIntent> {
        let amount = require_paid(tier)?;
        let now = self.now();
        self.read("payment_intent_precheck", |uow| {
            let place = require_place(uow, place)?;
            require_approved_owner(
                uow,
                user,
                place.id,
                "You can only pay for your own approved businesses.",
            )?;
            ensure_partner_slot_free(uow, &place, tier, now)
        })?;

        let intent = self.provider.create_intent(&IntentRequest {
            tg_user_id: user,
            place_id: place,
            tier,
            amount,
            source,
        })?;

        let mut event = LedgerEvent::new(
            intent.provider,
            intent.external_payment_id.clone(),
            PaymentEventType::InvoiceCreated,
            place,
            tier,
        )
        .amount(amount, self.settings.currency.clone())
        .actor(user);
        event.raw_payload.clone_from(&intent.invoice_payload);
        self.apply_payment_event(&event)?;
        Ok(intent)
    }

    /// Gate run by the provider before it charges the buyer.
    pub fn validate_pre_checkout(
        &self,
        user: TgUserId,
        raw_payload: &str,
        amount: i64,
        currency: &str,
        query_id: &str,
    ) -> ServiceResult<PaymentOutcome> {
        let payload = decode_payload(raw_payload)?;
        let provider = self.provider.name();
        let now = self.now();
        let event = LedgerEvent::new(
            provider,
            payload.external_payment_id.clone(),
            PaymentEventType::PreCheckoutOk,
            payload.place_id,
            payload.tier,
        )
        .amount(amount, currency)
        .raw_payload(json!({ "query_id": query_id }).to_string())
        .actor(user);

        let outcome = self.write("validate_pre_checkout", |uow| {
            let place = match_intent(uow, provider, &payload, user, amount, currency)?;
            ensure_partner_slot_free(uow, &place, payload.tier, now)?;
            apply_in(uow, &event, now)
        })?;
        self.log_outcome(&event, outcome);
        Ok(outcome)
    }

    /// Provider confirmation that the buyer was charged.
    ///
    /// Keyed by the provider's charge id, so a replayed confirmation is a
    /// duplicate.
    pub fn apply_successful_payment(
        &self,
        user: TgUserId,
        raw_payload: &str,
        amount: i64,
        currency: &str,
        charge_id: &str,
    ) -> ServiceResult<PaymentOutcome> {
        let payload = decode_payload(raw_payload)?;
        if charge_id.trim().is_empty() {
            return Err(ServiceError::validation(
                ValidationCode::InvalidInput,
                "Payment id is required.",
            ));
        }
        let provider = self.provider.name();
        let now = self.now();
        let event = LedgerEvent::new(
            provider,
            charge_id.trim(),
            PaymentEventType::PaymentSucceeded,
            payload.place_id,
            payload.tier,
        )
        .amount(amount, currency)
        .raw_payload(raw_payload.trim())
        .actor(user);

        let outcome = self.write("apply_successful_payment", |uow| {
            match_intent(uow, provider, &payload, user, amount, currency)?;
            apply_in(uow, &event, now)
        })?;
        self.log_outcome(&event, outcome);
        Ok(outcome)
    }

    /// Provider-reported cancel, failure or refund.
    ///
    /// `kind` accepts `cancel|canceled|cancelled`, `fail|failed` and
    /// `refund|refunded`. `external_id` defaults to the id in the payload.
    pub fn apply_terminal_event(
        &self,
        kind: &str,
        raw_payload: &str,
        external_id: Option<&str>,
        reason: Option<&str>,
    ) -> ServiceResult<PaymentOutcome> {
        let Some(event_type) = PaymentEventType::from_terminal_kind(kind) else {
            return Err(ServiceError::validation(
                ValidationCode::InvalidInput,
                format!("Unknown payment event kind {kind:?}."),
            ));
        };
        let payload = decode_payload(raw_payload)?;
        let external_id = external_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(&payload.external_payment_id);

        let mut event = LedgerEvent::new(
            self.provider.name(),
            external_id,
            event_type,
            payload.place_id,
            payload.tier,
        )
        .amount(
            monthly_price(payload.tier).unwrap_or(0),
            self.settings.currency.clone(),
        )
        .raw_payload(raw_payload.trim())
        .actor(payload.tg_user_id);
        event.reason = reason.map(str::to_string);
        self.apply_payment_event(&event)
    }

    /// Result of a mock checkout. Only accepted while the mock provider is
    /// registered.
    pub fn apply_mock_payment_result(
        &self,
        user: TgUserId,
        place: PlaceId,
        tier: Tier,
        external_id: &str,
        result: MockResult,
    ) -> ServiceResult<PaymentOutcome> {
        if self.provider.name() != MockPaymentProvider::NAME {
            return Err(ServiceError::validation(
                ValidationCode::InvalidState,
                "Mock payments are disabled.",
            ));
        }
        let amount = require_paid(tier)?;
        self.read("mock_payment_precheck", |uow| {
            require_approved_owner(
                uow,
                user,
                place,
                "You can only pay for your own approved businesses.",
            )
        })?;
        let event = LedgerEvent::new(
            MockPaymentProvider::NAME,
            external_id.trim(),
            result.event_type(),
            place,
            tier,
        )
        .amount(amount, self.settings.currency.clone())
        .actor(user);
        self.apply_payment_event(&event)
    }

    /// Revoke access for a refunded payment.
    ///
    /// Records a `refund` row keyed `admin-refund:<event_id>` and forces the
    /// subscription to `free` in one unit of work. Only `payment_succeeded`
    /// events can be refunded; a second call is a duplicate.
    pub fn admin_mark_payment_refund(
        &self,
        actor: TgUserId,
        event_id: PaymentEventId,
        reason: Option<&str>,
    ) -> ServiceResult<PaymentOutcome> {
        let cap = self.access.require_admin(actor)?;
        let now = self.now();
        let outcome = self.write("admin_mark_payment_refund", |uow| {
            let original = uow
                .payment_event(event_id)?
                .ok_or(ServiceError::NotFound(Missing::PaymentEvent(event_id)))?;
            if original.event_type != PaymentEventType::PaymentSucceeded {
                return Err(ServiceError::validation(
                    ValidationCode::NotRefundable,
                    "Only successful payments can be refunded.",
                ));
            }

            let key = format!("{ADMIN_REFUND_PREFIX}:{event_id}");
            let row = NewPaymentEvent {
                provider: &original.provider,
                external_payment_id: &key,
                event_type: PaymentEventType::Refund,
                place_id: original.place_id,
                tier: original.tier,
                amount: original.amount,
                currency: &original.currency,
                status: ledger_status(PaymentEventType::Refund),
                raw_payload: None,
            };
            let Some(refund_id) = uow.insert_payment_event(&row, now)? else {
                let existing =
                    uow.find_payment_event(&original.provider, &key, PaymentEventType::Refund)?;
                return Ok(PaymentOutcome {
                    applied: false,
                    duplicate: true,
                    event_id: existing.map(|e| e.id),
                });
            };

            set_free_in(uow, original.place_id, now)?;
            audit(
                uow,
                original.place_id,
                Some(cap.actor()),
                AuditAction::AdminPaymentRefund,
                &json!({
                    "payment_event_id": original.id,
                    "external_payment_id": original.external_payment_id,
                    "refund_event_id": refund_id,
                    "refund_reason": reason,
                }),
                now,
            )?;
            Ok(PaymentOutcome {
                applied: true,
                duplicate: false,
                event_id: Some(refund_id),
            })
        })?;

        if outcome.applied {
            tracing::info!(
                payment_event_id = %event_id,
                actor = %cap.actor(),
                "Payment refunded and subscription reset to free"
            );
        }
        Ok(outcome)
    }

    /// Newest first.
    pub fn payment_events_for(&self, place: PlaceId) -> ServiceResult<Vec<PaymentEvent>> {
        self.read("payment_events_for", |uow| {
            Ok(uow.payment_events_for_place(place, EVENT_LIST_LIMIT)?)
        })
    }
}

/// Check a decoded payload against its `invoice_created` row.
fn match_intent(
    uow: &UnitOfWork<'_>,
    provider: &str,
    payload: &InvoicePayload,
    user: TgUserId,
    amount: i64,
    currency: &str,
) -> ServiceResult<Place> {
    if payload.tg_user_id != user {
        return Err(intent_mismatch("This invoice was issued to another user."));
    }
    let invoice = uow
        .find_payment_event(
            provider,
            &payload.external_payment_id,
            PaymentEventType::InvoiceCreated,
        )?
        .ok_or_else(|| intent_mismatch("This invoice is unknown."))?;
    if invoice.place_id != payload.place_id || invoice.tier != payload.tier {
        return Err(intent_mismatch("The invoice does not match this plan."));
    }
    if invoice.amount != amount || !invoice.currency.eq_ignore_ascii_case(currency.trim()) {
        return Err(intent_mismatch("The invoice amount does not match."));
    }
    require_place(uow, payload.place_id)
}
