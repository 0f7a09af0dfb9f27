//! Timestamp encoding and the injectable clock.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub type Timestamp = DateTime<Utc>;

/// Length of one paid subscription period.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Format a timestamp as fixed-width RFC 3339 (`YYYY-MM-DDTHH:MM:SS.ffffffZ`).
///
/// Fixed width keeps lexical order equal to chronological order, which the
/// store relies on for `expires_at < ?` predicates.
#[must_use]
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse any RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Expiry for a subscription of `months` periods starting at `start`.
///
/// `months` is clamped to `1..=12`.
#[must_use]
pub fn period_end(start: Timestamp, months: u32) -> Timestamp {
    let months = i64::from(months.clamp(1, 12));
    start + Duration::days(SUBSCRIPTION_PERIOD_DAYS * months)
}

/// Source of "now" for every state transition.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<Timestamp>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
