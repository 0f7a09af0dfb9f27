use rusqlite::ErrorCode;
use thiserror::Error;

/// Failure talking to the database.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another connection holds the write lock (`SQLITE_BUSY` / `SQLITE_LOCKED`).
    #[error("database is busy: {0}")]
    Busy(#[source] rusqlite::Error),
    /// A UNIQUE, CHECK or FOREIGN KEY constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(#[source] rusqlite::Error),
    #[error("corrupt value {value:?} in {table}.{column}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        value: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors that may succeed if the whole unit of work is retried.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        self.is_busy()
    }
}

/// Unparsable column value, carried through rusqlite's conversion error.
#[derive(Debug, Error)]
#[error("corrupt value {value:?} in {table}.{column}")]
pub(crate) struct CorruptValue {
    pub table: &'static str,
    pub column: &'static str,
    pub value: String,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, _) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Busy(err),
                ErrorCode::ConstraintViolation => StoreError::Constraint(err),
                _ => StoreError::Sqlite(err),
            },
            rusqlite::Error::FromSqlConversionFailure(idx, ty, source) => {
                match source.downcast::<CorruptValue>() {
                    Ok(corrupt) => StoreError::Corrupt {
                        table: corrupt.table,
                        column: corrupt.column,
                        value: corrupt.value,
                    },
                    Err(source) => {
                        StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(idx, ty, source))
                    }
                }
            }
            other => StoreError::Sqlite(other),
        }
    }
}
