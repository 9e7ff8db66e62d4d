//! Airwatch - Air Quality Collector
//!
//! Periodically fetches one air-quality reading from a sensor API, normalizes
//! it into a [`Measurement`] and fans it out to up to three independent sinks:
//! a SQLite store, an append-only CSV file and a third-party ingestion
//! endpoint. A companion migration imports historical CSV files into the store
//! with duplicate suppression.
//!
//! # Architecture
//!
//! - **Config**: YAML configuration with environment expansion ([`AppConfig`])
//! - **Collector**: transport, normalizer and the collection loop
//! - **Sinks**: database, CSV file and forwarding delivery targets
//! - **Storage**: SQLite persistence for measurements
//! - **Migration**: CSV-to-store batch import
//!
//! The `airwatch` binary wires these together; everything is usable as a
//! library as well.

pub mod collector;
pub mod config;
pub mod migration;
pub mod sink;
pub mod storage;

pub use collector::{
    AirQualityCollector, CollectorError, CycleOutcome, HttpTransport, Normalized, Normalizer,
    Transport, TransportError,
};
pub use config::{AppConfig, ConfigError};
pub use migration::{ImportReport, MigrationEngine, MigrationError, RowOutcome};
pub use sink::{Delivery, Sink, SinkError, SinkKind, SinkSet};
pub use storage::{
    IdentityKey, Location, Measurement, MeasurementStats, MeasurementStore, StorageError,
};
