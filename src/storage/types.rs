//! Core data types for the storage layer.
//!
//! - [`Measurement`]: One normalized air-quality observation
//! - [`IdentityKey`]: `(timestamp, city)` pair used for duplicate detection
//! - [`StoredMeasurement`]: A measurement as persisted, with store-generated fields
//! - [`MeasurementStats`]: Aggregates over the whole table

use chrono::{DateTime, NaiveDateTime, SubsecRound, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format shared by the store and the CSV file (UTC, no offset).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format an instant as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD HH:MM:SS` string as a UTC instant.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT).map(|naive| naive.and_utc())
}

/// Geographic identity of a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// City label (part of the identity key).
    pub city: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl Location {
    pub fn new(city: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            city: city.into(),
            latitude,
            longitude,
        }
    }
}

/// Particulate matter concentrations (µg/m³).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
}

/// Ambient conditions reported alongside the pollutants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Temperature in °C.
    pub temperature: Option<f64>,
    /// Relative humidity in %.
    pub humidity: Option<f64>,
    /// Pressure in hPa.
    pub pressure: Option<f64>,
}

/// One air-quality reading at one point in time.
///
/// Optional fields are `None` when the provider did not report them, which is
/// distinct from a reported zero. The timestamp carries whole seconds only,
/// the precision of both the relational store and the CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Collection instant (UTC).
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    pub pollutants: Pollutants,
    pub environment: Environment,
    /// Provider-computed index (first index entry, provider scale).
    pub air_quality_index: Option<f64>,
    /// Physical sensor / installation identifier.
    pub station_id: Option<i64>,
}

impl Measurement {
    /// Create a measurement with every optional field absent.
    pub fn new(timestamp: DateTime<Utc>, location: Location) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            location,
            pollutants: Pollutants::default(),
            environment: Environment::default(),
            air_quality_index: None,
            station_id: None,
        }
    }

    pub fn with_pollutants(mut self, pollutants: Pollutants) -> Self {
        self.pollutants = pollutants;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_air_quality_index(mut self, aqi: Option<f64>) -> Self {
        self.air_quality_index = aqi;
        self
    }

    pub fn with_station_id(mut self, station_id: Option<i64>) -> Self {
        self.station_id = station_id;
        self
    }

    /// UTC hour derived from the timestamp.
    pub fn hour_of_day(&self) -> u32 {
        self.timestamp.hour()
    }

    /// UTC minute derived from the timestamp.
    pub fn minute_of_hour(&self) -> u32 {
        self.timestamp.minute()
    }

    /// Timestamp in the persisted `YYYY-MM-DD HH:MM:SS` form.
    pub fn formatted_timestamp(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Deduplication key. Measured values and station id are not part of it.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            timestamp: self.timestamp,
            city: self.location.city.clone(),
        }
    }
}

/// Observation identity: two measurements with the same key are the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub timestamp: DateTime<Utc>,
    pub city: String,
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.city, format_timestamp(&self.timestamp))
    }
}

/// A measurement row read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMeasurement {
    /// Store-generated identifier.
    pub id: i64,
    pub measurement: Measurement,
    /// Insertion time as recorded by the store.
    pub created_at: Option<DateTime<Utc>>,
}

/// Table-wide aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasurementStats {
    pub total_records: i64,
    pub cities: i64,
    pub stations: i64,
    pub first_record: Option<DateTime<Utc>>,
    pub last_record: Option<DateTime<Utc>>,
    pub avg_pm25: Option<f64>,
    pub avg_pm10: Option<f64>,
    pub avg_aqi: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gdansk() -> Location {
        Location::new("Gdansk", 54.352, 18.6466)
    }

    #[test]
    fn test_new_measurement_has_no_optional_fields() {
        let m = Measurement::new(Utc::now(), gdansk());
        assert_eq!(m.pollutants, Pollutants::default());
        assert_eq!(m.environment, Environment::default());
        assert!(m.air_quality_index.is_none());
        assert!(m.station_id.is_none());
    }

    #[test]
    fn test_timestamp_truncated_to_seconds() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 7, 45, 12).unwrap()
            + chrono::Duration::milliseconds(987);
        let m = Measurement::new(ts, gdansk());
        assert_eq!(m.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 7, 45, 12).unwrap());
    }

    #[test]
    fn test_derived_hour_and_minute() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 23, 5, 0).unwrap();
        let m = Measurement::new(ts, gdansk());
        assert_eq!(m.hour_of_day(), 23);
        assert_eq!(m.minute_of_hour(), 5);
        assert_eq!(m.formatted_timestamp(), "2024-03-01 23:05:00");
    }

    #[test]
    fn test_identity_key_ignores_measured_values() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let a = Measurement::new(ts, gdansk()).with_pollutants(Pollutants {
            pm25: Some(10.0),
            pm10: None,
        });
        let b = Measurement::new(ts, gdansk())
            .with_pollutants(Pollutants {
                pm25: Some(99.0),
                pm10: Some(1.0),
            })
            .with_station_id(Some(7));
        assert_eq!(a.identity_key(), b.identity_key());

        let other_city = Measurement::new(ts, Location::new("Sopot", 54.352, 18.6466));
        assert_ne!(a.identity_key(), other_city.identity_key());
    }

    #[test]
    fn test_parse_timestamp_roundtrip() {
        let ts = parse_timestamp("2023-12-31 00:59:59").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2023, 12, 31, 0, 59, 59).unwrap());
        assert_eq!(format_timestamp(&ts), "2023-12-31 00:59:59");
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2023-12-31T00:59:59Z").is_err());
        assert!(parse_timestamp("31.12.2023 00:59").is_err());
    }
}
