//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure. Callers that
//! process rows in a batch use [`StorageError::is_connection_failure`] to tell
//! a failed statement (row-scoped) from a lost or unreachable database.

use std::time::Duration;

use thiserror::Error;

/// SQLite primary result codes after which the open transaction can no
/// longer be trusted: BUSY, NOMEM, READONLY, IOERR, CORRUPT, FULL.
const FATAL_SQLITE_CODES: [i64; 6] = [5, 7, 8, 10, 11, 13];

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connecting to the database did not finish in time.
    #[error("database connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Invalid data in database (e.g., unparseable timestamp).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Internal error (e.g., filesystem preparation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether the error means the connection itself is unusable.
    ///
    /// SQLite errors that roll back or poison the open transaction (disk
    /// full, I/O error, corruption, out of memory, busy after the timeout)
    /// count as connection failures. Statement-level failures (constraint
    /// violations, type mismatches, missing tables) return `false`.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| is_fatal_sqlite_code(&code))
            }
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Configuration(_)
            ),
            Self::ConnectTimeout(_) => true,
            Self::Migration(_) | Self::InvalidData(_) | Self::Internal(_) => false,
        }
    }
}

/// `code` is the extended result code as reported by the driver; the
/// primary code is its low byte.
fn is_fatal_sqlite_code(code: &str) -> bool {
    code.parse::<i64>()
        .is_ok_and(|extended| FATAL_SQLITE_CODES.contains(&(extended & 0xff)))
}
