pub mod config;
pub mod db {
    pub mod models;
    pub mod pool;
}
pub mod schema;
pub mod sensors;
pub mod store;
pub mod utils;
pub mod services {
    pub mod dashboard;
    pub mod generator;
    pub mod ingest;
    pub mod stats;
}

use crate::config::Config;
use crate::sensors::{MeasurementKind, SENSOR_LOCATIONS};
use crate::services::dashboard::Dashboard;
use crate::services::ingest::RawReading;
use crate::store::{PgReadingStore, ReadingStore};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use diesel::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Environmental sensor reading store and dashboard queries.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations and exit
    Migrate,
    /// Store one reading (all five measurements are required)
    Append {
        #[arg(long)]
        sensor: i32,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        pressure: Option<f64>,
        #[arg(long)]
        humidity: Option<f64>,
        #[arg(long)]
        gas_composition: Option<f64>,
        #[arg(long)]
        noise_level: Option<f64>,
    },
    /// Chart series for one sensor
    Series {
        sensor: i32,
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
    /// Most recent reading of every sensor
    Latest,
    /// Averages, record count and time span for one sensor
    Stats { sensor: i32 },
    /// Total records and sensors active in the last 24 hours
    SystemStats,
    /// Fill the virtual sensors with synthetic history
    Generate {
        /// Days of history; defaults to GENERATOR_DAYS
        #[arg(long)]
        days: Option<u32>,
    },
    /// Delete all readings except the live device's
    ClearTest,
    /// Delete only the live device's readings
    ClearLive,
    /// Delete every reading
    ClearAll,
    /// Print the sensor registry and measurement ranges
    Sensors,
}

#[derive(Serialize)]
struct SensorRegistry<'a> {
    live_sensor_id: i32,
    locations: &'a [sensors::SensorLocation],
    measurements: Vec<(MeasurementKind, &'static sensors::MeasurementSpec)>,
}

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| format!("serializing output failed: {}", e))?;
    println!("{}", out);
    Ok(())
}

fn run(command: Command) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (pool_size={}, statement_timeout={}s, live_sensor_id={}, generator_days={}, generator_interval={}min, generator_profile={:?})",
        cfg.pool_size,
        cfg.statement_timeout.as_secs(),
        cfg.live_sensor_id,
        cfg.generator_days,
        cfg.generator_interval_minutes,
        cfg.generator_profile
    );

    if let Command::Sensors = command {
        return print_json(&SensorRegistry {
            live_sensor_id: cfg.live_sensor_id,
            locations: &SENSOR_LOCATIONS,
            measurements: MeasurementKind::ALL.iter().map(|&k| (k, k.spec())).collect(),
        });
    }

    // 2) Connect DB
    let pool = db::pool::build_pool(&cfg)?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    {
        let mut conn = pool.get().map_err(|e| format!("DB connection failed: {}", e))?;
        apply_database_migrations(&mut conn)?;
    }
    if let Command::Migrate = command {
        return Ok(());
    }

    let store: Arc<dyn ReadingStore> = Arc::new(PgReadingStore::new(pool));
    let dashboard = Dashboard::new(store, cfg);

    match command {
        Command::Append {
            sensor,
            timestamp,
            temperature,
            pressure,
            humidity,
            gas_composition,
            noise_level,
        } => {
            let resp = dashboard.append_response(&RawReading {
                sensor_id: sensor,
                timestamp,
                temperature,
                pressure,
                humidity,
                gas_composition,
                noise_level,
            });
            print_json(&resp)?;
            match resp.error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
        Command::Series { sensor, hours } => print_json(&dashboard.get_series(sensor, hours)),
        Command::Latest => print_json(&dashboard.get_latest()),
        Command::Stats { sensor } => print_json(&dashboard.get_statistics(sensor)),
        Command::SystemStats => print_json(&dashboard.get_system_stats()),
        Command::Generate { days } => {
            let resp = dashboard.run_generator(days);
            print_json(&resp)?;
            resp.error.map_or(Ok(()), Err)
        }
        Command::ClearTest => print_json(&dashboard.clear_test_data()),
        Command::ClearLive => print_json(&dashboard.clear_live_data()),
        Command::ClearAll => print_json(&dashboard.clear_all()),
        Command::Migrate | Command::Sensors => Ok(()),
    }
}

/// Loads `path` if given, otherwise `./.env` when present. Variables already
/// set in the process environment win.
fn load_env_file(path: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    match path {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            dotenvy::from_path(path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
            Ok(Some(LoadedEnvFile {
                path: path.to_path_buf(),
                explicit: true,
            }))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(format!("failed to load .env: {}", e)),
        },
    }
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match load_env_file(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "envmon {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
