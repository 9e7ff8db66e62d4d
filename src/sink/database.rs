//! Relational store sink.

use crate::sink::{Sink, SinkError, SinkKind};
use crate::storage::{Measurement, MeasurementStore};

/// Inserts each measurement through [`MeasurementStore::insert`], which opens
/// and closes its own connection per delivery.
#[derive(Debug, Clone)]
pub struct DatabaseSink {
    store: MeasurementStore,
}

impl DatabaseSink {
    pub fn new(store: MeasurementStore) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Sink for DatabaseSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Database
    }

    async fn deliver(&self, measurement: &Measurement) -> Result<(), SinkError> {
        let id = self.store.insert(measurement).await?;
        tracing::info!(
            id,
            timestamp = %measurement.formatted_timestamp(),
            pm25 = ?measurement.pollutants.pm25,
            pm10 = ?measurement.pollutants.pm10,
            aqi = ?measurement.air_quality_index,
            "Saved measurement to database"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Location, Pollutants, SqliteConnector};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[tokio::test]
    async fn test_deliver_inserts_row() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("air.db").display());
        let store = MeasurementStore::new(SqliteConnector::new(&url, Duration::from_secs(5)).unwrap());
        store.setup().await.unwrap();

        let sink = DatabaseSink::new(store.clone());
        let m = Measurement::new(
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            Location::new("Gdansk", 54.352, 18.6466),
        )
        .with_pollutants(Pollutants {
            pm25: Some(7.5),
            pm10: None,
        });

        sink.deliver(&m).await.unwrap();

        let stored = store.find(&m.identity_key()).await.unwrap().unwrap();
        assert_eq!(stored.measurement.pollutants.pm25, Some(7.5));
        assert_eq!(stored.measurement.pollutants.pm10, None);
    }

    #[tokio::test]
    async fn test_deliver_without_schema_fails() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("empty.db").display());
        let store = MeasurementStore::new(SqliteConnector::new(&url, Duration::from_secs(5)).unwrap());

        let sink = DatabaseSink::new(store);
        let m = Measurement::new(Utc::now(), Location::new("Gdansk", 54.352, 18.6466));
        let err = sink.deliver(&m).await.unwrap_err();
        assert!(matches!(err, SinkError::Storage(_)));
    }
}
