//! Collection cycle and the continuous collector loop.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;

use crate::collector::normalizer::{Normalized, Normalizer, ProviderPayload};
use crate::collector::{CollectorError, Headers, Schedule, Transport};
use crate::config::{AppConfig, ProviderConfig};
use crate::sink::{Delivery, SinkSet};
use crate::storage::Measurement;

const API_KEY_HEADER: &str = "apikey";

/// Result of one fetch, normalize and fan-out cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A measurement was produced and every enabled sink was attempted.
    Delivered {
        measurement: Measurement,
        deliveries: Vec<Delivery>,
    },
    /// The provider answered without a usable measurement. No sink ran.
    NoData,
    /// Fetching or decoding failed. No sink ran.
    Failed(CollectorError),
}

impl CycleOutcome {
    /// True only when a measurement was produced and no mandatory sink failed.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Delivered { deliveries, .. } => {
                !deliveries.iter().any(Delivery::is_blocking_failure)
            }
            Self::NoData | Self::Failed(_) => false,
        }
    }
}

/// Fetches one reading per cycle and fans it out to the configured sinks.
pub struct AirQualityCollector {
    provider: ProviderConfig,
    normalizer: Normalizer,
    schedule: Schedule,
    transport: Arc<dyn Transport>,
    sinks: SinkSet,
}

impl AirQualityCollector {
    /// Create a collector.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if no provider API key is configured.
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        sinks: SinkSet,
    ) -> Result<Self, CollectorError> {
        if config.provider.api_key.trim().is_empty() {
            return Err(CollectorError::Config(
                "provider.api_key is not configured".to_string(),
            ));
        }

        Ok(Self {
            provider: config.provider.clone(),
            normalizer: Normalizer::new(
                config.location.clone(),
                Some(config.provider.installation_id),
            ),
            schedule: Schedule::interval(config.collector.interval),
            transport,
            sinks,
        })
    }

    async fn fetch(&self) -> Result<ProviderPayload, CollectorError> {
        let url = self.provider.measurements_url();
        let mut headers = Headers::new();
        headers.insert(API_KEY_HEADER.to_string(), self.provider.api_key.clone());

        tracing::debug!(url = %url, "Fetching measurement from provider");
        let body = self
            .transport
            .get(&url, &headers, self.provider.timeout)
            .await?;
        Ok(ProviderPayload::from_slice(&body)?)
    }

    /// Run exactly one cycle.
    pub async fn collect_once(&self) -> CycleOutcome {
        let payload = match self.fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch measurement");
                return CycleOutcome::Failed(e);
            }
        };

        let measurement = match self.normalizer.normalize(&payload, Utc::now()) {
            Normalized::Measurement(m) => m,
            Normalized::NoData => {
                tracing::warn!("No measurement data in provider response");
                return CycleOutcome::NoData;
            }
        };

        tracing::debug!(
            timestamp = %measurement.formatted_timestamp(),
            pm25 = ?measurement.pollutants.pm25,
            pm10 = ?measurement.pollutants.pm10,
            aqi = ?measurement.air_quality_index,
            "Normalized measurement"
        );

        let deliveries = self.sinks.deliver_all(&measurement).await;
        CycleOutcome::Delivered {
            measurement,
            deliveries,
        }
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// The first cycle starts immediately. The next one starts `interval`
    /// after the previous one finished, so cycles never overlap. Failed
    /// cycles are logged and never end the loop.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let period = self.schedule.period();

        loop {
            tokio::select! {
                outcome = self.collect_once() => {
                    if outcome.is_success() {
                        tracing::info!("Data collection successful");
                    } else {
                        tracing::warn!("Data collection failed, will retry next interval");
                    }
                }
                _ = &mut shutdown => break,
            }

            tracing::info!(interval = %humantime::format_duration(period), "Sleeping until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = &mut shutdown => break,
            }
        }

        tracing::info!("Collector stopped");
    }

    /// Log the effective configuration. The API key is never logged.
    pub fn log_banner(&self, config: &AppConfig) {
        let location = &config.location;
        tracing::info!(
            city = %location.city,
            latitude = location.latitude,
            longitude = location.longitude,
            station_id = config.provider.installation_id,
            schedule = %self.schedule,
            "Air quality collector"
        );
        log_sink("database", config.database.enabled, &config.database.url);
        log_sink(
            "csv",
            config.csv.enabled,
            &config.csv.path.display().to_string(),
        );
        log_sink("forwarder", config.forwarder.enabled, &config.forwarder.url);
    }
}

fn log_sink(name: &str, enabled: bool, target: &str) {
    if enabled {
        tracing::info!(sink = name, destination = target, "Sink enabled");
    } else {
        tracing::info!(sink = name, "Sink disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::TransportError;
    use crate::sink::{Sink, SinkError, SinkKind};
    use crate::storage::Location;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TEST_INTERVAL: Duration = Duration::from_secs(1);

    const PAYLOAD: &str = r#"{"current": {
        "values": [{"name": "PM25", "value": 11.0}, {"name": "PM10", "value": 17.0}],
        "indexes": [{"value": 22.0}]
    }}"#;

    struct FakeProvider {
        response: Result<&'static str, u16>,
        requests: Mutex<Vec<(String, Headers)>>,
    }

    impl FakeProvider {
        fn ok(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(body),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn status(status: u16) -> Arc<Self> {
            Arc::new(Self {
                response: Err(status),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeProvider {
        async fn get(
            &self,
            url: &str,
            headers: &Headers,
            _timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), headers.clone()));
            match self.response {
                Ok(body) => Ok(body.as_bytes().to_vec()),
                Err(status) => Err(TransportError::Status {
                    url: url.to_string(),
                    status,
                }),
            }
        }

        async fn post(
            &self,
            url: &str,
            _headers: &Headers,
            _body: Vec<u8>,
            _timeout: Duration,
            _verify_tls: bool,
        ) -> Result<u16, TransportError> {
            Err(TransportError::Request {
                url: url.to_string(),
                message: "unused".to_string(),
            })
        }
    }

    struct StubSink {
        kind: SinkKind,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl StubSink {
        fn new(kind: SinkKind, fail: bool, calls: &Arc<AtomicUsize>) -> Self {
            Self {
                kind,
                fail,
                calls: calls.clone(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Sink for StubSink {
        fn kind(&self) -> SinkKind {
            self.kind
        }

        async fn deliver(&self, _measurement: &Measurement) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SinkError::Internal(format!("{} unavailable", self.kind)))
            } else {
                Ok(())
            }
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.provider.api_key = "test-key".to_string();
        config.provider.base_url = "http://provider.test/v2/measurements/installation".to_string();
        config.location = Location::new("Gdansk", 54.352, 18.6466);
        config.collector.interval = TEST_INTERVAL;
        config
    }

    fn collector(transport: Arc<dyn Transport>, sinks: SinkSet) -> AirQualityCollector {
        AirQualityCollector::new(&config(), transport, sinks).unwrap()
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut config = config();
        config.provider.api_key = String::new();
        let result = AirQualityCollector::new(&config, FakeProvider::ok(PAYLOAD), SinkSet::new());
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }

    #[tokio::test]
    async fn test_request_carries_installation_and_key() {
        let provider = FakeProvider::ok(PAYLOAD);
        let c = collector(provider.clone(), SinkSet::new());
        c.collect_once().await;

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].0,
            "http://provider.test/v2/measurements/installation?installationId=3387"
        );
        assert_eq!(requests[0].1.get("apikey").unwrap(), "test-key");
    }

    #[tokio::test]
    async fn test_measurement_stamped_with_station() {
        let c = collector(FakeProvider::ok(PAYLOAD), SinkSet::new());
        match c.collect_once().await {
            CycleOutcome::Delivered { measurement, .. } => {
                assert_eq!(measurement.station_id, Some(3387));
                assert_eq!(measurement.pollutants.pm25, Some(11.0));
                assert_eq!(measurement.air_quality_index, Some(22.0));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_database_ok_forwarder_failed_is_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sinks = SinkSet::new()
            .with(StubSink::new(SinkKind::Database, false, &calls))
            .with(StubSink::new(SinkKind::Forwarder, true, &calls));

        let outcome = collector(FakeProvider::ok(PAYLOAD), sinks).collect_once().await;
        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_database_failed_csv_ok_is_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sinks = SinkSet::new()
            .with(StubSink::new(SinkKind::Database, true, &calls))
            .with(StubSink::new(SinkKind::Csv, false, &calls));

        let outcome = collector(FakeProvider::ok(PAYLOAD), sinks).collect_once().await;
        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match outcome {
            CycleOutcome::Delivered { deliveries, .. } => {
                assert!(deliveries[1].is_ok());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_data_skips_sinks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sinks = SinkSet::new().with(StubSink::new(SinkKind::Database, false, &calls));

        let outcome = collector(FakeProvider::ok(r#"{"current": {"values": []}, "history": []}"#), sinks)
            .collect_once()
            .await;
        assert!(matches!(outcome, CycleOutcome::NoData));
        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_skips_sinks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sinks = SinkSet::new().with(StubSink::new(SinkKind::Csv, false, &calls));

        let outcome = collector(FakeProvider::status(503), sinks).collect_once().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed(CollectorError::Transport(TransportError::Status { status: 503, .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_body_fails_cycle() {
        let outcome = collector(FakeProvider::ok("<html>maintenance</html>"), SinkSet::new())
            .collect_once()
            .await;
        assert!(matches!(outcome, CycleOutcome::Failed(CollectorError::Payload(_))));
    }

    #[tokio::test]
    async fn test_no_sinks_enabled_is_success() {
        let outcome = collector(FakeProvider::ok(PAYLOAD), SinkSet::new())
            .collect_once()
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_run_until_cycles_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sinks = SinkSet::new().with(StubSink::new(SinkKind::Database, true, &calls));
        let c = collector(FakeProvider::ok(PAYLOAD), sinks);

        // Cycles at t=0 and t=1s; shutdown fires during the second sleep.
        let shutdown = tokio::time::sleep(TEST_INTERVAL + Duration::from_millis(500));
        c.run_until(shutdown).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
