//! Append-only CSV file sink and the shared CSV row format.
//!
//! The same layout is read back by the migration engine, so a file written
//! here is always a valid migration source.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sink::{Sink, SinkError, SinkKind};
use crate::storage::{Environment, Location, Measurement, Pollutants, parse_timestamp};

/// Header row, in column order.
pub const CSV_HEADERS: [&str; 12] = [
    "datetime_utc",
    "city",
    "lat",
    "lon",
    "hour_utc",
    "minute_utc",
    "PM25",
    "PM10",
    "TEMPERATURE",
    "HUMIDITY",
    "PRESSURE",
    "AQI",
];

/// Outgoing row; field order matches [`CSV_HEADERS`].
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    datetime_utc: String,
    city: &'a str,
    lat: f64,
    lon: f64,
    hour_utc: u32,
    minute_utc: u32,
    pm25: Option<f64>,
    pm10: Option<f64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    aqi: Option<f64>,
}

impl<'a> From<&'a Measurement> for CsvRow<'a> {
    fn from(m: &'a Measurement) -> Self {
        Self {
            datetime_utc: m.formatted_timestamp(),
            city: &m.location.city,
            lat: m.location.latitude,
            lon: m.location.longitude,
            hour_utc: m.hour_of_day(),
            minute_utc: m.minute_of_hour(),
            pm25: m.pollutants.pm25,
            pm10: m.pollutants.pm10,
            temperature: m.environment.temperature,
            humidity: m.environment.humidity,
            pressure: m.environment.pressure,
            aqi: m.air_quality_index,
        }
    }
}

/// Incoming row from a historical file.
///
/// Empty optional cells decode to `None`; a non-numeric cell is an error.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvRecord {
    pub datetime_utc: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub hour_utc: Option<u32>,
    #[serde(default)]
    pub minute_utc: Option<u32>,
    #[serde(rename = "PM25", default)]
    pub pm25: Option<f64>,
    #[serde(rename = "PM10", default)]
    pub pm10: Option<f64>,
    #[serde(rename = "TEMPERATURE", default)]
    pub temperature: Option<f64>,
    #[serde(rename = "HUMIDITY", default)]
    pub humidity: Option<f64>,
    #[serde(rename = "PRESSURE", default)]
    pub pressure: Option<f64>,
    #[serde(rename = "AQI", default)]
    pub aqi: Option<f64>,
    #[serde(default)]
    pub station_id: Option<i64>,
}

impl CsvRecord {
    /// Convert into a measurement, using `default_station` when the row has none.
    ///
    /// Hour and minute columns are not trusted; they are derived again from
    /// the timestamp.
    pub fn into_measurement(self, default_station: Option<i64>) -> Result<Measurement, String> {
        if self.city.trim().is_empty() {
            return Err("city is empty".to_string());
        }
        let timestamp = parse_timestamp(self.datetime_utc.trim())
            .map_err(|e| format!("invalid datetime_utc '{}': {e}", self.datetime_utc))?;

        Ok(
            Measurement::new(timestamp, Location::new(self.city, self.lat, self.lon))
                .with_pollutants(Pollutants {
                    pm25: self.pm25,
                    pm10: self.pm10,
                })
                .with_environment(Environment {
                    temperature: self.temperature,
                    humidity: self.humidity,
                    pressure: self.pressure,
                })
                .with_air_quality_index(self.aqi)
                .with_station_id(self.station_id.or(default_station)),
        )
    }
}

/// Reader over a historical file: header row required, fields trimmed.
pub fn csv_reader<R: std::io::Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(source)
}

/// Appends one row per measurement, writing the header into a new or empty file.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn append_row(path: &Path, measurement: &Measurement) -> Result<(), SinkError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if needs_header {
        writer.write_record(CSV_HEADERS)?;
    }
    writer.serialize(CsvRow::from(measurement))?;
    writer.flush()?;
    Ok(())
}

#[async_trait::async_trait]
impl Sink for CsvFileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Csv
    }

    async fn deliver(&self, measurement: &Measurement) -> Result<(), SinkError> {
        let path = self.path.clone();
        let measurement = measurement.clone();
        tokio::task::spawn_blocking(move || append_row(&path, &measurement))
            .await
            .map_err(|e| SinkError::Internal(format!("CSV writer task failed: {e}")))??;

        tracing::info!(path = %self.path.display(), "Saved measurement to CSV");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bare() -> Measurement {
        Measurement::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap(),
            Location::new("Gdansk", 54.352, 18.6466),
        )
    }

    fn full() -> Measurement {
        bare()
            .with_pollutants(Pollutants {
                pm25: Some(12.5),
                pm10: Some(20.25),
            })
            .with_environment(Environment {
                temperature: Some(-3.5),
                humidity: Some(81.0),
                pressure: Some(1013.2),
            })
            .with_air_quality_index(Some(31.7))
            .with_station_id(Some(3387))
    }

    #[tokio::test]
    async fn test_header_written_once_and_dir_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("air.csv");
        let sink = CsvFileSink::new(&path);

        sink.deliver(&full()).await.unwrap();
        sink.deliver(&full()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADERS.join(","));
        assert_eq!(
            lines[1],
            "2025-06-01 14:30:00,Gdansk,54.352,18.6466,14,30,12.5,20.25,-3.5,81.0,1013.2,31.7"
        );
    }

    #[tokio::test]
    async fn test_absent_fields_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("air.csv");
        CsvFileSink::new(&path).deliver(&bare()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 12);
        assert!(fields[..6].iter().all(|f| !f.is_empty()));
        assert!(fields[6..].iter().all(|f| f.is_empty()));
    }

    #[tokio::test]
    async fn test_header_written_into_empty_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("air.csv");
        std::fs::write(&path, "").unwrap();

        CsvFileSink::new(&path).deliver(&bare()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("datetime_utc,city,"));
    }

    #[tokio::test]
    async fn test_unwritable_path_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let sink = CsvFileSink::new(dir.path());
        assert!(sink.deliver(&bare()).await.is_err());
    }

    #[tokio::test]
    async fn test_written_rows_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("air.csv");
        let sink = CsvFileSink::new(&path);
        sink.deliver(&full()).await.unwrap();
        sink.deliver(&bare()).await.unwrap();

        let mut reader = csv_reader(std::fs::File::open(&path).unwrap());
        let records: Vec<CsvRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);

        let parsed = records[0].clone().into_measurement(Some(3387)).unwrap();
        assert_eq!(parsed, full());

        let parsed = records[1].clone().into_measurement(None).unwrap();
        assert_eq!(parsed, bare());
    }

    #[test]
    fn test_record_validation() {
        let record = CsvRecord {
            datetime_utc: "not a date".to_string(),
            city: "Gdansk".to_string(),
            lat: 54.0,
            lon: 18.0,
            hour_utc: None,
            minute_utc: None,
            pm25: None,
            pm10: None,
            temperature: None,
            humidity: None,
            pressure: None,
            aqi: None,
            station_id: Some(9),
        };
        assert!(record.clone().into_measurement(None).is_err());

        let record = CsvRecord {
            datetime_utc: "2025-06-01 14:30:00".to_string(),
            city: " ".to_string(),
            ..record
        };
        assert!(record.into_measurement(None).is_err());
    }
}
