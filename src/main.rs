//! CLI entry point for the GTFS-RT vehicle tracker.
//!
//! `run` is the long-lived service: it pulls the configured feed on a fixed
//! interval, serves the health endpoint, and purges stale inactive vehicles.
//! The other subcommands are one-shot operator tools.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gtfs_rt_tracker::{
    config::AppConfig,
    decoder::decode_feed,
    fetch::{client_from_config, load_source},
    health::{self, HealthState},
    output::{append_records, print_json, print_pretty},
    pull::Puller,
    reconcile::ReconciliationEngine,
    retention,
    store::{PgStore, migrate},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_tracker")]
#[command(about = "Track vehicle positions from a GTFS-RT feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull the feed on the configured interval until Ctrl+C
    Run,
    /// Pull the feed once and reconcile it into the database
    Pull,
    /// Decode a GTFS-RT feed from a file or URL without touching the database
    Decode {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// CSV file to append decoded vehicles to
        #[arg(short, long)]
        output: Option<String>,

        /// Print decoded vehicles as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Apply database migrations
    Migrate,
    /// Delete inactive vehicles not seen for a while
    Purge {
        /// Maximum age in seconds (defaults to retention.max_age)
        #[arg(long, value_name = "SECS")]
        max_age: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/gtfs_rt_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run().await?,
        Commands::Pull => {
            let config = load_config()?;
            let store = connect(&config).await?;
            let puller = Puller::new(
                client_from_config(&config.feed)?,
                config.feed.url.clone(),
                ReconciliationEngine::new(store),
            );

            let summary = puller.pull_once().await?;
            print_pretty(&summary.report);
            info!(
                upserted = summary.reconciled.upserted,
                deactivated = summary.reconciled.deactivated,
                "Pull complete"
            );
        }
        Commands::Decode {
            source,
            output,
            json,
        } => {
            // Only the feed section matters here, so the config is not validated.
            let config = AppConfig::load()?;
            let client = client_from_config(&config.feed)?;

            let bytes = load_source(&client, &source).await?;
            let decoded = decode_feed(&bytes, Utc::now());
            if let Some(e) = decoded.error {
                return Err(e).context(format!("{source} is not a GTFS-RT feed"));
            }

            print_pretty(&decoded.report);
            if json {
                print_json(&decoded.records)?;
            }
            if let Some(path) = output {
                append_records(&path, &decoded.records)?;
                info!(path = %path, rows = decoded.records.len(), "Wrote vehicles to CSV");
            }
        }
        Commands::Migrate => {
            let config = load_config()?;
            let store = PgStore::connect(&config.database).await?;
            migrate(store.pool()).await?;
            info!("Migrations applied");
        }
        Commands::Purge { max_age } => {
            let config = load_config()?;
            let store = PgStore::connect(&config.database).await?;
            let max_age = max_age
                .map(Duration::from_secs)
                .unwrap_or(config.retention.max_age);

            let cutoff = retention::cutoff(Utc::now(), max_age);
            let purged = store.purge_inactive_before(cutoff).await?;
            info!(purged, cutoff = %cutoff, "Purge complete");
        }
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

/// Connects to the database and brings the schema up to date.
async fn connect(config: &AppConfig) -> Result<PgStore> {
    let store = PgStore::connect(&config.database).await?;
    migrate(store.pool()).await?;
    Ok(store)
}

/// Runs the puller, the health endpoint and retention until Ctrl+C.
async fn run() -> Result<()> {
    let config = load_config()?;
    let store = connect(&config).await?;
    let client = client_from_config(&config.feed)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health_state = Arc::new(HealthState::new());

    let listener = health::bind(config.health.addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {}", config.health.addr))?;
    let server = {
        let (state, shutdown) = (Arc::clone(&health_state), shutdown_rx.clone());
        tokio::spawn(async move {
            if let Err(e) = health::serve(listener, state, shutdown).await {
                error!(error = %e, "Health endpoint failed");
            }
        })
    };
    let cleanup = tokio::spawn(retention::run(
        store.clone(),
        config.retention.clone(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let puller = Puller::new(client, config.feed.url.clone(), ReconciliationEngine::new(store));
    puller
        .run(config.scheduler.interval, health_state, shutdown_rx)
        .await;

    if let Err(e) = server.await {
        warn!(error = %e, "Health endpoint task aborted");
    }
    if let Err(e) = cleanup.await {
        warn!(error = %e, "Retention task aborted");
    }

    info!("Shutdown complete");
    Ok(())
}
