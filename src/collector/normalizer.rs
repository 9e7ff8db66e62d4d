//! Provider payload normalization.
//!
//! Turns the provider's nested `current` / `history` document into a
//! [`Measurement`]. Only the narrow set of value names below is mapped;
//! anything else the provider reports is dropped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::storage::{Environment, Location, Measurement, Pollutants};

const PM25: &str = "PM25";
const PM10: &str = "PM10";
const TEMPERATURE: &str = "TEMPERATURE";
const HUMIDITY: &str = "HUMIDITY";
const PRESSURE: &str = "PRESSURE";

/// Provider response document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderPayload {
    #[serde(default)]
    pub current: Option<PayloadSection>,
    /// `null` entries are kept so that an empty first window is not
    /// mistaken for a decode error.
    #[serde(default)]
    pub history: Option<Vec<Option<PayloadSection>>>,
}

/// One measurement window in the provider response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadSection {
    #[serde(default)]
    pub values: Option<Vec<NamedValue>>,
    #[serde(default)]
    pub indexes: Option<Vec<IndexValue>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedValue {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexValue {
    #[serde(default)]
    pub value: Option<f64>,
}

impl PayloadSection {
    fn has_values(&self) -> bool {
        self.values.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// A window with neither `values` nor `indexes` carries nothing to read.
    fn is_usable(&self) -> bool {
        self.values.is_some() || self.indexes.is_some()
    }
}

impl ProviderPayload {
    /// Decode a raw response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// `current` when it carries values, otherwise the first history window
    /// if it is usable.
    pub fn source(&self) -> Option<&PayloadSection> {
        match &self.current {
            Some(current) if current.has_values() => Some(current),
            _ => self
                .history
                .as_ref()
                .and_then(|h| h.first())
                .and_then(Option::as_ref)
                .filter(|first| first.is_usable()),
        }
    }
}

/// Result of normalizing one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Measurement(Measurement),
    /// Valid response without a usable measurement window.
    NoData,
}

/// Stamps provider values with the configured location and station.
#[derive(Debug, Clone)]
pub struct Normalizer {
    location: Location,
    station_id: Option<i64>,
}

impl Normalizer {
    pub fn new(location: Location, station_id: Option<i64>) -> Self {
        Self {
            location,
            station_id,
        }
    }

    /// Normalize `payload` into a measurement taken at `now`.
    ///
    /// The collection instant is used, not any provider-reported window time.
    pub fn normalize(&self, payload: &ProviderPayload, now: DateTime<Utc>) -> Normalized {
        let Some(source) = payload.source() else {
            return Normalized::NoData;
        };

        // Later duplicates overwrite earlier ones.
        let values: HashMap<&str, Option<f64>> = source
            .values
            .iter()
            .flatten()
            .map(|v| (v.name.as_str(), v.value))
            .collect();
        let lookup = |name: &str| values.get(name).copied().flatten();

        let aqi = source
            .indexes
            .as_ref()
            .and_then(|indexes| indexes.first())
            .and_then(|index| index.value);

        let measurement = Measurement::new(now, self.location.clone())
            .with_pollutants(Pollutants {
                pm25: lookup(PM25),
                pm10: lookup(PM10),
            })
            .with_environment(Environment {
                temperature: lookup(TEMPERATURE),
                humidity: lookup(HUMIDITY),
                pressure: lookup(PRESSURE),
            })
            .with_air_quality_index(aqi)
            .with_station_id(self.station_id);

        Normalized::Measurement(measurement)
    }
}
