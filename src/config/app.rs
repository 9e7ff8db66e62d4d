//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::Location;
use crate::storage::db::DEFAULT_CONNECT_TIMEOUT;

use super::validation::{
    ConfigError, expand_env_vars, require_non_empty, require_non_zero, require_range,
};

// =============================================================================
// Constants
// =============================================================================

/// Default collection interval (1 hour).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Default timeout for outbound HTTP calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default provider endpoint (installation query).
pub const DEFAULT_PROVIDER_URL: &str = "https://airapi.airly.eu/v2/measurements/installation";

/// Default provider installation.
pub const DEFAULT_INSTALLATION_ID: i64 = 3387;

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/airwatch.db";

/// Default CSV backup location.
pub const DEFAULT_CSV_PATH: &str = "data/airly_gdansk.csv";

fn default_location() -> Location {
    Location::new("Gdansk", 54.3520, 18.6466)
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Sensor API settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key sent in the `apikey` header.
    pub api_key: String,

    /// Installation (station) to query; also stamped on every measurement.
    pub installation_id: i64,

    /// Endpoint URL without query string.
    pub base_url: String,

    /// Request timeout (default: 30s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            installation_id: DEFAULT_INSTALLATION_ID,
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("installation_id", &self.installation_id)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Full measurement URL for the configured installation.
    pub fn measurements_url(&self) -> String {
        format!(
            "{}?installationId={}",
            self.base_url.trim_end_matches('/'),
            self.installation_id
        )
    }
}

// =============================================================================
// Collector Configuration
// =============================================================================

/// Collector loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Sleep between cycles (default: 1h).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

// =============================================================================
// Sink Configurations
// =============================================================================

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Deliver measurements to the database (default: true).
    pub enabled: bool,

    /// SQLite URL, e.g. `sqlite:data/airwatch.db`.
    pub url: String,

    /// Connection timeout (default: 10s).
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_DATABASE_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Append-only CSV file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Deliver measurements to the CSV file (default: false).
    pub enabled: bool,

    /// File path; parent directories are created on demand.
    pub path: PathBuf,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(DEFAULT_CSV_PATH),
        }
    }
}

/// Third-party ingestion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Forward measurements (default: false).
    pub enabled: bool,

    /// Ingestion endpoint URL.
    pub url: String,

    /// Sensor id expected by the ingestion API.
    pub sensor_id: i64,

    /// Altitude used in the position literal.
    pub altitude: f64,

    /// Verify the endpoint's TLS certificate (default: true).
    pub verify_tls: bool,

    /// Request timeout (default: 30s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            sensor_id: 1,
            altitude: 10.0,
            verify_tls: true,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
///
/// Built once at startup and handed to components by reference; nothing
/// reads the process environment after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sensor API.
    pub provider: ProviderConfig,

    /// Static location stamped on every measurement.
    pub location: Location,

    /// Collector loop.
    pub collector: CollectorSettings,

    /// Relational sink.
    pub database: DatabaseConfig,

    /// CSV sink.
    pub csv: CsvConfig,

    /// Forwarding sink.
    pub forwarder: ForwarderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            location: default_location(),
            collector: CollectorSettings::default(),
            database: DatabaseConfig::default(),
            csv: CsvConfig::default(),
            forwarder: ForwarderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` / `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("location.city", &self.location.city)?;
        require_range("location.latitude", self.location.latitude, -90.0, 90.0)?;
        require_range("location.longitude", self.location.longitude, -180.0, 180.0)?;

        require_non_empty("provider.base_url", &self.provider.base_url)?;
        require_non_zero("provider.timeout", self.provider.timeout)?;
        require_non_zero("collector.interval", self.collector.interval)?;

        if !self.database.url.starts_with("sqlite:") {
            return Err(ConfigError::ValidationError(format!(
                "database.url must be a sqlite: URL, got '{}'",
                self.database.url
            )));
        }
        require_non_zero("database.connect_timeout", self.database.connect_timeout)?;

        if self.csv.enabled && self.csv.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "csv.path cannot be empty when csv is enabled".to_string(),
            ));
        }

        if self.forwarder.enabled {
            require_non_empty("forwarder.url", &self.forwarder.url)?;
            require_non_zero("forwarder.timeout", self.forwarder.timeout)?;
        }

        Ok(())
    }
}
