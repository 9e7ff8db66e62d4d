//! SQLite backend implementation using sqlx.
//!
//! Hands out one short-lived connection per unit of work. Nothing is pooled
//! across collection cycles.

use std::str::FromStr;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous};

use crate::storage::StorageError;

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection factory for a SQLite database.
///
/// - WAL journal mode for concurrent readers
/// - Normal synchronous mode for performance with durability
/// - Create database if not exists
#[derive(Clone)]
pub struct SqliteConnector {
    url: String,
    options: SqliteConnectOptions,
    connect_timeout: Duration,
}

impl std::fmt::Debug for SqliteConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnector")
            .field("url", &self.url)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl SqliteConnector {
    /// Build a connector from a URL such as `sqlite:data/airwatch.db`.
    ///
    /// The URL is validated here; no connection is opened.
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(connect_timeout)
            .create_if_missing(true);

        Ok(Self {
            url: url.to_string(),
            options,
            connect_timeout,
        })
    }

    /// The URL this connector was built from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a fresh connection, creating the database file and its parent
    /// directory when missing.
    pub async fn connect(&self) -> Result<SqliteConnection, StorageError> {
        self.ensure_parent_dir()?;

        tokio::time::timeout(self.connect_timeout, self.options.connect())
            .await
            .map_err(|_| StorageError::ConnectTimeout(self.connect_timeout))?
            .map_err(StorageError::from)
    }

    fn ensure_parent_dir(&self) -> Result<(), StorageError> {
        if self.url.contains(":memory:") {
            return Ok(());
        }

        if let Some(parent) = self.options.get_filename().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

/// Close a connection, logging instead of failing.
///
/// Used on paths where the unit of work already has its own result.
pub async fn close_quietly(conn: SqliteConnection) {
    use sqlx::Connection;

    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "Failed to close database connection");
    }
}
