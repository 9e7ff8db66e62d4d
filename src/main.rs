//! Airwatch Binary Entry Point
//!
//! Runs the collector (continuously or once) and the database utility
//! commands. Core functionality is provided by the `airwatch` library crate.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use airwatch::{
    AirQualityCollector, AppConfig, HttpTransport, MeasurementStore, MigrationEngine, SinkSet,
    Transport,
    config::parse_duration,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Airwatch - Air Quality Collector
#[derive(Parser, Debug)]
#[command(name = "airwatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "AIRWATCH_CONFIG"
    )]
    config: PathBuf,

    /// Database URL (overrides config file)
    #[arg(long, env = "AIRWATCH_DB_URL")]
    db_url: Option<String>,

    /// CSV backup file (overrides config file)
    #[arg(long, env = "AIRWATCH_CSV_FILE")]
    csv_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect continuously until interrupted
    Run {
        /// Collection interval, e.g. `15m` (overrides config file)
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,
    },

    /// Run a single collection cycle
    Once,

    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Create the database and schema, then show status
    Setup,

    /// Show record counts and averages
    Status,

    /// Verify the database is reachable
    Check,

    /// Import a historical CSV file
    Migrate {
        /// CSV file to import (defaults to the configured CSV path)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Insert rows even if (timestamp, city) is already stored
        #[arg(long)]
        allow_duplicates: bool,
    },

    /// Delete all measurements
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,airwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if let Some(path) = cli.csv_file {
        config.csv.path = path;
    }
    if let Command::Run {
        interval: Some(interval),
    } = &cli.command
    {
        config.collector.interval = *interval;
    }
    config.validate()?;

    let ok = match cli.command {
        Command::Run { .. } => run(&config).await?,
        Command::Once => once(&config).await?,
        Command::Db { command } => db(&config, command).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn build_collector(config: &AppConfig) -> Result<AirQualityCollector, Box<dyn std::error::Error>> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    let sinks = SinkSet::from_config(config, Arc::clone(&transport))?;
    Ok(AirQualityCollector::new(config, transport, sinks)?)
}

/// Create the schema up front so the first delivery does not fail on a
/// fresh database file.
async fn prepare_store(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !config.database.enabled {
        return Ok(());
    }
    let store = MeasurementStore::from_config(&config.database)?;
    if let Err(e) = store.setup().await {
        tracing::warn!(url = %store.url(), error = %e, "Database setup failed, will retry on delivery");
    }
    Ok(())
}

async fn run(config: &AppConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let collector = build_collector(config)?;
    collector.log_banner(config);
    prepare_store(config).await?;

    tracing::info!("Press Ctrl+C to shutdown");
    collector.run_until(shutdown_signal()).await;

    tracing::info!("Shutdown complete");
    Ok(true)
}

async fn once(config: &AppConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let collector = build_collector(config)?;
    collector.log_banner(config);
    prepare_store(config).await?;

    let outcome = collector.collect_once().await;
    if outcome.is_success() {
        tracing::info!("Single collection completed");
    } else {
        tracing::error!("Collection failed");
    }
    Ok(outcome.is_success())
}

async fn db(config: &AppConfig, command: DbCommand) -> Result<bool, Box<dyn std::error::Error>> {
    let store = MeasurementStore::from_config(&config.database)?;

    match command {
        DbCommand::Setup => {
            tracing::info!(url = %store.url(), "Running database setup");
            if let Err(e) = store.setup().await {
                tracing::error!(error = %e, "Database setup failed");
                return Ok(false);
            }
            tracing::info!("Schema ready");
            Ok(show_status(&store).await)
        }
        DbCommand::Status => Ok(show_status(&store).await),
        DbCommand::Check => Ok(check(&store).await),
        DbCommand::Migrate {
            csv,
            allow_duplicates,
        } => {
            let source = csv.unwrap_or_else(|| config.csv.path.clone());
            let engine = MigrationEngine::new(store)
                .with_default_station(Some(config.provider.installation_id))
                .with_deduplication(!allow_duplicates);
            match engine.migrate_file(&source).await {
                Ok(report) => {
                    tracing::info!("Rows imported: {}", report.imported);
                    if report.duplicates > 0 {
                        tracing::info!("Duplicates skipped: {}", report.duplicates);
                    }
                    if report.skipped > 0 {
                        tracing::info!("Errors skipped: {}", report.skipped);
                    }
                    Ok(true)
                }
                Err(e) => {
                    tracing::error!(source = %source.display(), error = %e, "Migration failed");
                    Ok(false)
                }
            }
        }
        DbCommand::Clear { force } => {
            if !force && !confirm("Are you sure you want to clear all data? (yes/no): ")? {
                tracing::info!("Clear operation cancelled");
                return Ok(true);
            }
            match store.clear().await {
                Ok(deleted) => {
                    tracing::info!(deleted, "Table cleared");
                    Ok(true)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to clear table");
                    Ok(false)
                }
            }
        }
    }
}

async fn check(store: &MeasurementStore) -> bool {
    match store.check().await {
        Ok(()) => {
            tracing::info!(url = %store.url(), "Database connection successful");
            true
        }
        Err(e) => {
            tracing::error!(url = %store.url(), error = %e, "Database connection failed");
            false
        }
    }
}

async fn show_status(store: &MeasurementStore) -> bool {
    tracing::info!("Database: {}", store.url());
    if !check(store).await {
        return false;
    }

    match store.stats().await {
        Ok(stats) => {
            tracing::info!("Total records: {}", stats.total_records);
            tracing::info!("Cities: {}, stations: {}", stats.cities, stats.stations);
            if let (Some(first), Some(last)) = (stats.first_record, stats.last_record) {
                tracing::info!("First record: {}", airwatch::storage::format_timestamp(&first));
                tracing::info!("Last record: {}", airwatch::storage::format_timestamp(&last));
            }
            tracing::info!(
                avg_pm25 = ?stats.avg_pm25,
                avg_pm10 = ?stats.avg_pm10,
                avg_aqi = ?stats.avg_aqi,
                "Averages"
            );
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read statistics");
            false
        }
    }
}

/// Ask on stdout, read one line from stdin; only `yes` confirms.
fn confirm(prompt: &str) -> std::io::Result<bool> {
    let mut stdout = std::io::stdout();
    stdout.write_all(prompt.as_bytes())?;
    stdout.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
