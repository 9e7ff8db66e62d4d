//! Storage Layer
//!
//! SQLite persistence for measurements. Every operation acquires its own
//! connection and releases it before returning; no connection outlives a
//! collection cycle.
//!
//! # Components
//!
//! - [`Measurement`] and friends: the canonical record
//! - [`MeasurementStore`]: insert, duplicate probe, statistics, maintenance
//! - [`SqliteConnector`]: connection factory with WAL defaults
//! - [`StorageError`]: storage failures, split into connection-level and row-level

pub mod db;
mod error;
pub mod measurement_store;
pub mod schema;
mod types;

pub use db::SqliteConnector;
pub use error::StorageError;
pub use measurement_store::MeasurementStore;
pub use types::{
    DATETIME_FORMAT, Environment, IdentityKey, Location, Measurement, MeasurementStats,
    Pollutants, StoredMeasurement, format_timestamp, parse_timestamp,
};
