//! Collector Layer
//!
//! Fetches one provider reading per cycle, normalizes it and hands it to the
//! sink set. Cycles run strictly one after another on a fixed interval.
//!
//! # Architecture
//!
//! - [`Transport`]: timed HTTP GET/POST, implemented by [`HttpTransport`]
//! - [`Normalizer`]: provider payload to [`Measurement`](crate::storage::Measurement)
//! - [`AirQualityCollector`]: one cycle ([`collect_once`](AirQualityCollector::collect_once))
//!   or the continuous loop ([`run_until`](AirQualityCollector::run_until))
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use airwatch::{AirQualityCollector, AppConfig, HttpTransport, SinkSet, Transport};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("configs/config.yaml")?;
//! let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
//! let sinks = SinkSet::from_config(&config, transport.clone())?;
//! let collector = AirQualityCollector::new(&config, transport, sinks)?;
//! let outcome = collector.collect_once().await;
//! println!("success: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```

mod http;
pub mod normalizer;
mod runner;
mod traits;

pub use http::HttpTransport;
pub use normalizer::{Normalized, Normalizer, ProviderPayload};
pub use runner::{AirQualityCollector, CycleOutcome};
pub use traits::{
    CollectorError, Headers, MIN_INTERVAL, Schedule, Transport, TransportError,
};
