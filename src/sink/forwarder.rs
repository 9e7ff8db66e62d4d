//! Best-effort forwarding to a third-party ingestion endpoint.

use std::sync::Arc;

use serde::Serialize;

use crate::collector::{Headers, Transport};
use crate::config::ForwarderConfig;
use crate::sink::{Sink, SinkError, SinkKind};
use crate::storage::Measurement;

/// PM1.0 is not measured; it is approximated from PM2.5.
const PM1_FROM_PM25: f64 = 0.7;

/// Ingestion API document. Absent readings are sent as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardPayload {
    pub id: i64,
    pub ts: String,
    pub pos: String,
    pub temp: f64,
    pub hum: f64,
    pub pres: f64,
    pub mass_pm2_5: f64,
    pub mass_pm10: f64,
    pub mass_pm1_0: f64,
    pub mass_pm4: f64,
    pub number_pm0_5: f64,
    pub number_pm1_0: f64,
    pub number_pm2_5: f64,
    pub number_pm4: f64,
    pub number_pm10: f64,
}

impl ForwardPayload {
    pub fn build(measurement: &Measurement, sensor_id: i64, altitude: f64) -> Self {
        let pm25 = measurement.pollutants.pm25.unwrap_or(0.0);
        let pm10 = measurement.pollutants.pm10.unwrap_or(0.0);
        let env = &measurement.environment;

        Self {
            id: sensor_id,
            ts: measurement.formatted_timestamp(),
            pos: format!(
                "POINTZ({:?} {:?} {:?})",
                measurement.location.latitude, measurement.location.longitude, altitude
            ),
            temp: env.temperature.unwrap_or(0.0),
            hum: env.humidity.unwrap_or(0.0),
            pres: env.pressure.unwrap_or(0.0),
            mass_pm2_5: pm25,
            mass_pm10: pm10,
            mass_pm1_0: pm25 * PM1_FROM_PM25,
            mass_pm4: pm10,
            number_pm0_5: 0.0,
            number_pm1_0: 0.0,
            number_pm2_5: 0.0,
            number_pm4: 0.0,
            number_pm10: 0.0,
        }
    }
}

/// Posts each measurement as JSON. Failures are reported, never retried.
pub struct ForwarderSink {
    config: ForwarderConfig,
    transport: Arc<dyn Transport>,
}

impl ForwarderSink {
    pub fn new(config: ForwarderConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }
}

impl std::fmt::Debug for ForwarderSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwarderSink")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sink for ForwarderSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Forwarder
    }

    async fn deliver(&self, measurement: &Measurement) -> Result<(), SinkError> {
        let payload =
            ForwardPayload::build(measurement, self.config.sensor_id, self.config.altitude);
        let body = serde_json::to_vec(&payload)?;

        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let status = self
            .transport
            .post(
                &self.config.url,
                &headers,
                body,
                self.config.timeout,
                self.config.verify_tls,
            )
            .await?;

        tracing::info!(url = %self.config.url, status, "Forwarded measurement");
        Ok(())
    }
}
