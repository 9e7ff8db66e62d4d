//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Provider settings (API key, installation, endpoint, timeout)
//! - Static location identity
//! - Collection interval
//! - Sink settings (database, CSV file, forwarding endpoint)
//!
//! Every value may reference the environment with `${VAR}` or
//! `${VAR:-default}`; expansion happens once, at load time.

mod app;
mod validation;

pub use app::{
    AppConfig, CollectorSettings, CsvConfig, DatabaseConfig, ForwarderConfig, ProviderConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_CSV_PATH, DEFAULT_DATABASE_URL, DEFAULT_HTTP_TIMEOUT, DEFAULT_INSTALLATION_ID,
    DEFAULT_INTERVAL, DEFAULT_PROVIDER_URL,
};
