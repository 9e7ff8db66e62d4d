//! Measurement persistence.
//!
//! [`MeasurementStore`] owns the connection settings and opens a new
//! connection for every operation. The free functions [`insert_with`] and
//! [`exists`] run on a caller-supplied connection so a batch can share one
//! transaction.

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};

use crate::config::DatabaseConfig;
use crate::storage::StorageError;
use crate::storage::db::{SqliteConnector, close_quietly};
use crate::storage::schema::init_schema;
use crate::storage::types::{
    Environment, IdentityKey, Location, Measurement, MeasurementStats, Pollutants,
    StoredMeasurement, format_timestamp, parse_timestamp,
};

const INSERT_SQL: &str = r#"
    INSERT INTO measurements
        (datetime_utc, city, lat, lon, hour_utc, minute_utc,
         pm25, pm10, temperature, humidity, pressure, aqi, station_id)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const EXISTS_SQL: &str = "SELECT id FROM measurements WHERE datetime_utc = ? AND city = ? LIMIT 1";

const SELECT_BY_KEY_SQL: &str = r#"
    SELECT id, datetime_utc, city, lat, lon, pm25, pm10, temperature, humidity,
           pressure, aqi, station_id, created_at
    FROM measurements
    WHERE datetime_utc = ? AND city = ?
    ORDER BY id
    LIMIT 1
"#;

const STATS_SQL: &str = r#"
    SELECT COUNT(*),
           COUNT(DISTINCT city),
           COUNT(DISTINCT station_id),
           MIN(datetime_utc),
           MAX(datetime_utc),
           AVG(pm25),
           AVG(pm10),
           AVG(aqi)
    FROM measurements
"#;

/// Decimal digits kept for coordinates.
const COORDINATE_SCALE: f64 = 1_000_000.0;

fn round_coordinate(value: f64) -> f64 {
    (value * COORDINATE_SCALE).round() / COORDINATE_SCALE
}

/// Relational store for measurements.
#[derive(Debug, Clone)]
pub struct MeasurementStore {
    connector: SqliteConnector,
}

impl MeasurementStore {
    /// Create a store over an existing connector.
    pub fn new(connector: SqliteConnector) -> Self {
        Self { connector }
    }

    /// Create a store from database configuration.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, StorageError> {
        Ok(Self::new(SqliteConnector::new(
            &config.url,
            config.connect_timeout,
        )?))
    }

    /// Database URL, for logging.
    pub fn url(&self) -> &str {
        self.connector.url()
    }

    /// Open a new connection. The caller owns and closes it.
    pub async fn connect(&self) -> Result<SqliteConnection, StorageError> {
        self.connector.connect().await
    }

    /// Create the database and schema if missing.
    pub async fn setup(&self) -> Result<(), StorageError> {
        let mut conn = self.connect().await?;
        let result = init_schema(&mut conn).await;
        close_quietly(conn).await;
        result
    }

    /// Verify the database is reachable.
    pub async fn check(&self) -> Result<(), StorageError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query("SELECT 1")
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(StorageError::from);
        close_quietly(conn).await;
        result
    }

    /// Insert one measurement in its own connection and transaction.
    ///
    /// The transaction is rolled back and the connection closed on failure.
    /// Returns the generated row id.
    pub async fn insert(&self, measurement: &Measurement) -> Result<i64, StorageError> {
        let mut conn = self.connect().await?;
        let result = insert_committed(&mut conn, measurement).await;
        close_quietly(conn).await;
        result
    }

    /// Look up the first row with the given identity key.
    pub async fn find(&self, key: &IdentityKey) -> Result<Option<StoredMeasurement>, StorageError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(SELECT_BY_KEY_SQL)
            .bind(format_timestamp(&key.timestamp))
            .bind(key.city.as_str())
            .fetch_optional(&mut conn)
            .await
            .map_err(StorageError::from);
        close_quietly(conn).await;

        result?.map(|row| stored_from_row(&row)).transpose()
    }

    /// Aggregate statistics over all stored measurements.
    pub async fn stats(&self) -> Result<MeasurementStats, StorageError> {
        type StatsRow = (
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        );

        let mut conn = self.connect().await?;
        let result: Result<StatsRow, StorageError> = sqlx::query_as(STATS_SQL)
            .fetch_one(&mut conn)
            .await
            .map_err(StorageError::from);
        close_quietly(conn).await;

        let (total_records, cities, stations, first, last, avg_pm25, avg_pm10, avg_aqi) = result?;
        Ok(MeasurementStats {
            total_records,
            cities,
            stations,
            first_record: first.as_deref().map(parse_stored_timestamp).transpose()?,
            last_record: last.as_deref().map(parse_stored_timestamp).transpose()?,
            avg_pm25,
            avg_pm10,
            avg_aqi,
        })
    }

    /// Delete every measurement. Returns the number of rows removed.
    pub async fn clear(&self) -> Result<u64, StorageError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query("DELETE FROM measurements")
            .execute(&mut conn)
            .await
            .map(|r| r.rows_affected())
            .map_err(StorageError::from);
        close_quietly(conn).await;
        result
    }
}

async fn insert_committed(
    conn: &mut SqliteConnection,
    measurement: &Measurement,
) -> Result<i64, StorageError> {
    let mut tx = conn.begin().await?;
    match insert_with(&mut *tx, measurement).await {
        Ok(id) => {
            tx.commit().await?;
            Ok(id)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Insert a measurement on an open connection (or transaction).
///
/// Coordinates are rounded to 6 decimal digits; hour and minute are derived
/// from the timestamp.
pub async fn insert_with(
    conn: &mut SqliteConnection,
    measurement: &Measurement,
) -> Result<i64, StorageError> {
    let result = sqlx::query(INSERT_SQL)
        .bind(measurement.formatted_timestamp())
        .bind(measurement.location.city.as_str())
        .bind(round_coordinate(measurement.location.latitude))
        .bind(round_coordinate(measurement.location.longitude))
        .bind(i64::from(measurement.hour_of_day()))
        .bind(i64::from(measurement.minute_of_hour()))
        .bind(measurement.pollutants.pm25)
        .bind(measurement.pollutants.pm10)
        .bind(measurement.environment.temperature)
        .bind(measurement.environment.humidity)
        .bind(measurement.environment.pressure)
        .bind(measurement.air_quality_index)
        .bind(measurement.station_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Whether a row with this identity key is already stored.
pub async fn exists(conn: &mut SqliteConnection, key: &IdentityKey) -> Result<bool, StorageError> {
    let row: Option<(i64,)> = sqlx::query_as(EXISTS_SQL)
        .bind(format_timestamp(&key.timestamp))
        .bind(key.city.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

fn parse_stored_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>, StorageError> {
    parse_timestamp(s).map_err(|e| StorageError::InvalidData(format!("timestamp '{s}': {e}")))
}

fn stored_from_row(row: &SqliteRow) -> Result<StoredMeasurement, StorageError> {
    let datetime: String = row.try_get("datetime_utc")?;
    let created_at: Option<String> = row.try_get("created_at")?;

    let measurement = Measurement::new(
        parse_stored_timestamp(&datetime)?,
        Location::new(
            row.try_get::<String, _>("city")?,
            row.try_get("lat")?,
            row.try_get("lon")?,
        ),
    )
    .with_pollutants(Pollutants {
        pm25: row.try_get("pm25")?,
        pm10: row.try_get("pm10")?,
    })
    .with_environment(Environment {
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
        pressure: row.try_get("pressure")?,
    })
    .with_air_quality_index(row.try_get("aqi")?)
    .with_station_id(row.try_get("station_id")?);

    Ok(StoredMeasurement {
        id: row.try_get("id")?,
        measurement,
        // CURRENT_TIMESTAMP uses the same text layout.
        created_at: created_at.as_deref().and_then(|s| parse_timestamp(s).ok()),
    })
}
