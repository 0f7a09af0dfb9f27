//! Expiry sweep and the background loop that drives it.
//!
//! The sweep runs three phases in order, each reading its candidates fresh:
//!
//! 1. `active` past `expires_at` becomes `past_due` (tier kept)
//! 2. `past_due` past `expires_at + grace` becomes `free/inactive`
//! 3. `canceled` past `expires_at` becomes `free/inactive`
//!
//! Every place is demoted in its own unit of work through a conditional
//! update, so the sweep races freely with user requests and a second run
//! right after the first changes nothing.

use std::sync::Arc;
use std::time::Duration;

use bizpass_config::MIN_RECONCILE_INTERVAL_SECS;
use bizpass_store::{Demotion, UnitOfWork};
use bizpass_types::{AuditAction, PlaceId, Subscription, Timestamp, format_timestamp};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::service::audit;
use crate::{BusinessService, ServiceResult};

const PHASES: [Demotion; 3] = [
    Demotion::ActiveToPastDue,
    Demotion::PastDueToFree,
    Demotion::CanceledToFree,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub active_to_past_due: usize,
    pub past_due_to_free: usize,
    pub canceled_to_free: usize,
    pub failed: usize,
}

impl SweepStats {
    #[must_use]
    pub fn total_changed(&self) -> usize {
        self.active_to_past_due + self.past_due_to_free + self.canceled_to_free
    }

    fn record(&mut self, demotion: Demotion) {
        match demotion {
            Demotion::ActiveToPastDue => self.active_to_past_due += 1,
            Demotion::PastDueToFree => self.past_due_to_free += 1,
            Demotion::CanceledToFree => self.canceled_to_free += 1,
        }
    }
}

const fn audit_action(demotion: Demotion) -> AuditAction {
    match demotion {
        Demotion::ActiveToPastDue => AuditAction::SubscriptionExpiredPastDue,
        Demotion::PastDueToFree => AuditAction::SubscriptionPastDueToFree,
        Demotion::CanceledToFree => AuditAction::SubscriptionCanceledToFree,
    }
}

impl BusinessService {
    /// Run one sweep. `grace_days` overrides the configured grace period.
    ///
    /// A place that fails to demote is logged and counted in
    /// [`SweepStats::failed`]; the sweep continues with the next one.
    pub fn reconcile_subscriptions(&self, grace_days: Option<u32>) -> ServiceResult<SweepStats> {
        let grace = chrono::Duration::days(i64::from(
            grace_days.unwrap_or(self.settings.grace_days),
        ));
        let now = self.now();
        let mut stats = SweepStats::default();

        for demotion in PHASES {
            let cutoff = match demotion {
                Demotion::PastDueToFree => now - grace,
                Demotion::ActiveToPastDue | Demotion::CanceledToFree => now,
            };
            let candidates = self.read("reconcile_candidates", |uow| {
                Ok(uow.expired_place_ids(demotion.source(), cutoff)?)
            })?;
            stats.scanned += candidates.len();

            for place in candidates {
                match self.demote_one(place, demotion, cutoff, now) {
                    Ok(true) => stats.record(demotion),
                    Ok(false) => {}
                    Err(err) => {
                        tracing::warn!(
                            place_id = %place,
                            ?demotion,
                            error = %err,
                            "Subscription demotion failed"
                        );
                        stats.failed += 1;
                    }
                }
            }
        }

        if stats.total_changed() > 0 || stats.failed > 0 {
            tracing::info!(
                scanned = stats.scanned,
                active_to_past_due = stats.active_to_past_due,
                past_due_to_free = stats.past_due_to_free,
                canceled_to_free = stats.canceled_to_free,
                failed = stats.failed,
                "Subscription sweep finished"
            );
        } else {
            tracing::debug!(scanned = stats.scanned, "Subscription sweep found nothing to do");
        }
        Ok(stats)
    }

    fn demote_one(
        &self,
        place: PlaceId,
        demotion: Demotion,
        cutoff: Timestamp,
        now: Timestamp,
    ) -> ServiceResult<bool> {
        self.write("reconcile_demote", |uow| {
            match uow.subscription(place)? {
                Some(before) => demote_in(uow, &before, demotion, cutoff, now),
                None => Ok(false),
            }
        })
    }
}

/// Apply `demotion` to `before`'s place if the row still qualifies, clearing
/// the mirror and writing one audit entry. Returns whether the row changed.
pub(crate) fn demote_in(
    uow: &UnitOfWork<'_>,
    before: &Subscription,
    demotion: Demotion,
    cutoff: Timestamp,
    now: Timestamp,
) -> ServiceResult<bool> {
    let place = before.place_id;
    if !uow.demote(place, demotion, cutoff, now)? {
        return Ok(false);
    }
    uow.set_verification_mirror(place, false, None, None)?;
    audit(
        uow,
        place,
        None,
        audit_action(demotion),
        &json!({
            "from_status": before.status,
            "tier": before.tier,
            "expires_at": before.expires_at.map(format_timestamp),
        }),
        now,
    )?;
    Ok(true)
}

/// Sweep every `interval` (at least the configured floor) until `shutdown`
/// turns `true` or its sender is dropped.
///
/// Sweeps run on the blocking pool. A failed sweep is logged and the loop
/// keeps going.
pub async fn run_reconcile_loop(
    service: Arc<BusinessService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = interval.max(Duration::from_secs(MIN_RECONCILE_INTERVAL_SECS));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_secs = period.as_secs(), "Reconciliation loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        if *shutdown.borrow() {
            break;
        }

        let svc = Arc::clone(&service);
        match tokio::task::spawn_blocking(move || svc.reconcile_subscriptions(None)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "Subscription sweep failed"),
            Err(err) => tracing::error!(error = %err, "Subscription sweep task panicked"),
        }
    }

    tracing::info!("Reconciliation loop stopped");
}
