//! CSV-to-store migration.
//!
//! Imports a historical CSV file (the layout written by
//! [`CsvFileSink`](crate::sink::CsvFileSink)) into the measurement store inside
//! one transaction. Rows are isolated from each other: a row that does not
//! parse, or that the store rejects, is counted as skipped and the batch goes
//! on. A connection-level failure rolls the whole batch back.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use thiserror::Error;

use crate::sink::{CsvRecord, csv_reader};
use crate::storage::db::close_quietly;
use crate::storage::measurement_store::{exists, insert_with};
use crate::storage::{Measurement, MeasurementStore, StorageError};

/// Batch-fatal migration failures.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("CSV file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("failed to read CSV file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid CSV file: {0}")]
    Csv(#[from] csv::Error),

    #[error("migration aborted: {0}")]
    Storage(#[from] StorageError),
}

/// What happened to one source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Imported,
    /// A row with the same (timestamp, city) is already stored.
    Duplicate,
    /// Row could not be parsed or was rejected by the store.
    Skipped(String),
}

/// Per-batch counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: u64,
    pub duplicates: u64,
    pub skipped: u64,
}

impl ImportReport {
    pub fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Imported => self.imported += 1,
            RowOutcome::Duplicate => self.duplicates += 1,
            RowOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    /// Rows read from the source.
    pub fn total(&self) -> u64 {
        self.imported + self.duplicates + self.skipped
    }
}

/// One-shot batch importer sharing the collector's store.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    store: MeasurementStore,
    default_station_id: Option<i64>,
    skip_duplicates: bool,
}

impl MigrationEngine {
    /// Engine with deduplication on and no default station.
    pub fn new(store: MeasurementStore) -> Self {
        Self {
            store,
            default_station_id: None,
            skip_duplicates: true,
        }
    }

    /// Station id for rows without a `station_id` column value.
    pub fn with_default_station(mut self, station_id: Option<i64>) -> Self {
        self.default_station_id = station_id;
        self
    }

    /// Probe for an existing (timestamp, city) row before each insert.
    pub fn with_deduplication(mut self, enabled: bool) -> Self {
        self.skip_duplicates = enabled;
        self
    }

    /// Import every row of `path`.
    ///
    /// # Errors
    /// Returns `MigrationError` if the file is missing or unreadable, or if the
    /// store connection fails. Nothing is committed in that case.
    pub async fn migrate_file(&self, path: &Path) -> Result<ImportReport, MigrationError> {
        if !tokio::fs::try_exists(path).await? {
            return Err(MigrationError::SourceNotFound(path.to_path_buf()));
        }
        let content = tokio::fs::read(path).await?;

        tracing::info!(
            source = %path.display(),
            deduplicate = self.skip_duplicates,
            "Migrating CSV data"
        );

        let mut conn = self.store.connect().await?;
        let result = self.import_all(&mut conn, &content).await;
        close_quietly(conn).await;

        match &result {
            Ok(report) => tracing::info!(
                imported = report.imported,
                duplicates = report.duplicates,
                skipped = report.skipped,
                "Migration complete"
            ),
            Err(e) => tracing::error!(error = %e, "Migration failed, batch rolled back"),
        }
        result
    }

    async fn import_all(
        &self,
        conn: &mut SqliteConnection,
        content: &[u8],
    ) -> Result<ImportReport, MigrationError> {
        let mut reader = csv_reader(content);
        // Header problems are batch-fatal; row problems are not.
        reader.headers()?;

        let mut tx = conn.begin().await.map_err(StorageError::from)?;
        let mut report = ImportReport::default();

        for (index, record) in reader.deserialize::<CsvRecord>().enumerate() {
            // Line 1 is the header.
            let line = index + 2;
            let parsed = record
                .map_err(|e| e.to_string())
                .and_then(|r| r.into_measurement(self.default_station_id));

            let outcome = match parsed {
                Ok(measurement) => match self.import_row(&mut *tx, &measurement).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_connection_failure() => {
                        if let Err(rollback) = tx.rollback().await {
                            tracing::warn!(error = %rollback, "Rollback failed");
                        }
                        return Err(e.into());
                    }
                    Err(e) => RowOutcome::Skipped(e.to_string()),
                },
                Err(reason) => RowOutcome::Skipped(reason),
            };

            match &outcome {
                RowOutcome::Skipped(reason) => {
                    tracing::warn!(line, reason = %reason, "Skipping row")
                }
                RowOutcome::Duplicate => tracing::debug!(line, "Duplicate row"),
                RowOutcome::Imported => {}
            }
            report.record(&outcome);
        }

        tx.commit().await.map_err(StorageError::from)?;
        Ok(report)
    }

    async fn import_row(
        &self,
        conn: &mut SqliteConnection,
        measurement: &Measurement,
    ) -> Result<RowOutcome, StorageError> {
        if self.skip_duplicates && exists(conn, &measurement.identity_key()).await? {
            return Ok(RowOutcome::Duplicate);
        }
        insert_with(conn, measurement).await?;
        Ok(RowOutcome::Imported)
    }
}
