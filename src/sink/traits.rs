//! Sink trait, kinds and errors.

use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::collector::TransportError;
use crate::storage::{Measurement, StorageError};

/// Delivery target kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SinkKind {
    /// Relational store.
    Database,
    /// Append-only CSV file.
    Csv,
    /// Third-party ingestion endpoint.
    Forwarder,
}

impl SinkKind {
    /// Whether a failure of this sink fails the collection cycle.
    ///
    /// Forwarding is best-effort and never counts.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Self::Database | Self::Csv)
    }
}

/// Per-sink delivery failure.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("forwarding failed: {0}")]
    Forward(#[from] TransportError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Blocking writer task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A delivery target for measurements.
///
/// Sinks are independent: one sink's failure never affects another's attempt.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Deliver one measurement.
    async fn deliver(&self, measurement: &Measurement) -> Result<(), SinkError>;
}

/// Outcome of one sink's delivery attempt.
#[derive(Debug)]
pub struct Delivery {
    pub sink: SinkKind,
    pub result: Result<(), SinkError>,
}

impl Delivery {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Failed and counts against the cycle.
    pub fn is_blocking_failure(&self) -> bool {
        self.sink.is_mandatory() && self.result.is_err()
    }
}
