//! SQLite persistence for the entitlement engine.
//!
//! Several independent processes open the same database file, so mutual
//! exclusion is expressed entirely as transaction discipline:
//!
//! - every mutation runs inside [`Store::write`], which opens an immediate
//!   (write-locking) transaction, hands the caller a [`UnitOfWork`], and
//!   commits only if the closure returns `Ok`
//! - a busy/locked failure rolls the whole unit back and re-runs the closure
//!   with exponential backoff plus jitter, up to the configured attempt count
//! - transition predicates are conditional updates whose affected-row count
//!   tells the caller whether the row was still in the expected state
//!
//! Closures passed to [`Store::write`] must not perform network calls.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod audit;
mod claim_tokens;
mod codec;
mod error;
mod owners;
mod payments;
mod places;
mod retry;
mod schema;
mod sqlite_util;
mod subscriptions;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bizpass_config::{BizpassConfig, RetrySettings};
use rusqlite::{Connection, TransactionBehavior};

pub use error::{StoreError, Transient};
pub use payments::NewPaymentEvent;
pub use retry::retry_delay;
pub use subscriptions::Demotion;

/// Connection-level settings shared by every process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub retry: RetrySettings,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(bizpass_config::DEFAULT_BUSY_TIMEOUT_MS),
            retry: RetrySettings::default(),
        }
    }
}

impl From<&BizpassConfig> for StoreOptions {
    fn from(config: &BizpassConfig) -> Self {
        Self {
            busy_timeout: config.busy_timeout(),
            retry: config.retry(),
        }
    }
}

/// One connection to the shared database.
///
/// A `Store` is `Sync`; concurrent callers in one process are serialized on the
/// connection mutex, while other processes contend through SQLite's own locks.
pub struct Store {
    conn: Mutex<Connection>,
    options: StoreOptions,
}

impl Store {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = sqlite_util::open_secure_db(path)?;
        Self::initialize(conn, options)
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, StoreOptions::default())
    }

    fn initialize(conn: Connection, options: StoreOptions) -> Result<Self, StoreError> {
        sqlite_util::apply_pragmas(&conn, options.busy_timeout)?;
        Self::create_schema(&conn, options.retry)?;
        Ok(Self {
            conn: Mutex::new(conn),
            options,
        })
    }

    // Several processes may start at once against a fresh file.
    fn create_schema(conn: &Connection, retry: RetrySettings) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            match conn.execute_batch(schema::SCHEMA) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let err = StoreError::from(err);
                    if !err.is_transient() || attempt + 1 >= retry.max_attempts {
                        return Err(err);
                    }
                    std::thread::sleep(retry_delay(attempt, &retry));
                    attempt += 1;
                }
            }
        }
    }

    #[must_use]
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Run `op` inside one immediate transaction, retrying on lock contention.
    ///
    /// `op` may be invoked more than once; it must derive every decision from
    /// what it reads through the unit of work.
    pub fn write<T, E, F>(&self, label: &'static str, op: F) -> Result<T, E>
    where
        F: FnMut(&UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError> + Transient,
    {
        self.run(label, TransactionBehavior::Immediate, op)
    }

    /// Run `op` against one consistent read snapshot.
    pub fn read<T, E, F>(&self, label: &'static str, op: F) -> Result<T, E>
    where
        F: FnMut(&UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError> + Transient,
    {
        self.run(label, TransactionBehavior::Deferred, op)
    }

    fn run<T, E, F>(&self, label: &'static str, behavior: TransactionBehavior, mut op: F) -> Result<T, E>
    where
        F: FnMut(&UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError> + Transient,
    {
        let retry = self.options.retry;
        let mut attempt = 0;
        loop {
            match self.run_once(behavior, &mut op) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < retry.max_attempts => {
                    let delay = retry_delay(attempt, &retry);
                    tracing::debug!(
                        op = label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying unit of work after busy database"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::warn!(
                            op = label,
                            attempts = attempt + 1,
                            "Giving up on unit of work: database stayed busy"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    fn run_once<T, E, F>(&self, behavior: TransactionBehavior, op: &mut F) -> Result<T, E>
    where
        F: FnMut(&UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(StoreError::from)?;
        let value = op(&UnitOfWork { conn: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads and writes of one logical operation, bound to an open transaction.
///
/// Dropping the enclosing transaction without commit rolls every write back.
pub struct UnitOfWork<'a> {
    conn: &'a Connection,
}
