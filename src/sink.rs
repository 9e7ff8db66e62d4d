//! Sink Layer
//!
//! Delivery targets for normalized measurements. Each sink is independent;
//! [`SinkSet`] attempts every enabled sink in turn and collects one
//! [`Delivery`] per attempt.
//!
//! - [`DatabaseSink`]: relational store, mandatory when enabled
//! - [`CsvFileSink`]: append-only CSV file, mandatory when enabled
//! - [`ForwarderSink`]: ingestion endpoint, best effort

mod csv_file;
mod database;
mod forwarder;
mod traits;

use std::sync::Arc;

pub use csv_file::{CSV_HEADERS, CsvFileSink, CsvRecord, csv_reader};
pub use database::DatabaseSink;
pub use forwarder::{ForwardPayload, ForwarderSink};
pub use traits::{Delivery, Sink, SinkError, SinkKind};

use crate::collector::Transport;
use crate::config::AppConfig;
use crate::storage::{Measurement, MeasurementStore, StorageError};

/// The enabled sinks, in delivery order.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn Sink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the sinks enabled in `config`.
    ///
    /// # Errors
    /// Returns `StorageError` if the database URL cannot be parsed.
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, StorageError> {
        let mut set = Self::new();
        if config.database.enabled {
            set.push(DatabaseSink::new(MeasurementStore::from_config(
                &config.database,
            )?));
        }
        if config.csv.enabled {
            set.push(CsvFileSink::new(&config.csv.path));
        }
        if config.forwarder.enabled {
            set.push(ForwarderSink::new(config.forwarder.clone(), transport));
        }
        Ok(set)
    }

    /// Add a sink after the existing ones.
    pub fn push(&mut self, sink: impl Sink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn with(mut self, sink: impl Sink + 'static) -> Self {
        self.push(sink);
        self
    }

    pub fn kinds(&self) -> Vec<SinkKind> {
        self.sinks.iter().map(|s| s.kind()).collect()
    }

    /// Attempt every sink, sequentially. A failure never skips later sinks.
    pub async fn deliver_all(&self, measurement: &Measurement) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let result = sink.deliver(measurement).await;
            if let Err(ref e) = result {
                if sink.kind().is_mandatory() {
                    tracing::error!(sink = %sink.kind(), error = %e, "Sink delivery failed");
                } else {
                    tracing::warn!(sink = %sink.kind(), error = %e, "Best-effort sink delivery failed");
                }
            }
            deliveries.push(Delivery {
                sink: sink.kind(),
                result,
            });
        }
        deliveries
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSet")
            .field("sinks", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::HttpTransport;
    use crate::storage::Location;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        kind: SinkKind,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Sink for CountingSink {
        fn kind(&self) -> SinkKind {
            self.kind
        }

        async fn deliver(&self, _measurement: &Measurement) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SinkError::Internal("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_skip_later_sinks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = SinkSet::new()
            .with(CountingSink {
                kind: SinkKind::Database,
                calls: calls.clone(),
                fail: true,
            })
            .with(CountingSink {
                kind: SinkKind::Csv,
                calls: calls.clone(),
                fail: false,
            });

        let m = Measurement::new(Utc::now(), Location::new("Gdansk", 54.352, 18.6466));
        let deliveries = set.deliver_all(&m).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries[0].result.is_err());
        assert!(deliveries[1].result.is_ok());
    }

    #[test]
    fn test_from_config_enables_selected_sinks() {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new().unwrap());

        let config = AppConfig::default();
        let set = SinkSet::from_config(&config, transport.clone()).unwrap();
        assert_eq!(set.kinds(), vec![SinkKind::Database]);

        let mut config = AppConfig::default();
        config.database.enabled = false;
        config.csv.enabled = true;
        config.forwarder.enabled = true;
        config.forwarder.url = "http://localhost:1/ingest".to_string();
        let set = SinkSet::from_config(&config, transport).unwrap();
        assert_eq!(set.kinds(), vec![SinkKind::Csv, SinkKind::Forwarder]);
    }
}
