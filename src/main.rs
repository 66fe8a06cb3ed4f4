//! Clickstream ETL
//!
//! Batch reconciliation of the raw analytics event log:
//! - Pageview, page exit, batch and form processors build sessions and child rows
//! - Daily metrics roll sessions up per site and UTC day
//! - Retention sweeps processed raw rows past their window
//!
//! `serve` exposes the operations over HTTP; the other subcommands run one
//! operation, print its JSON report and exit, which is how cron drives it.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{error, info};

use api::{router, AppState};
use etl_core::{EventKind, RetentionPolicy};
use etl_store::{health::check_connection, Store, StoreConfig};
use telemetry::{health, init_tracing_from_env};
use worker::{Pipeline, PipelineConfig, RunStatus};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    database: StoreConfig,

    #[serde(default)]
    pipeline: PipelineConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "clickstream-etl", version, about = "Clickstream event log reconciliation")]
struct Cli {
    /// Overrides `database.url` from the configuration
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the operator HTTP API (default)
    Serve,
    /// Run every processor once
    Run {
        #[arg(long)]
        batch_size: Option<i64>,
    },
    /// Run a single processor: pageview, page_exit, batch or form_submit
    Process {
        event_type: String,
        #[arg(long)]
        batch_size: Option<i64>,
    },
    /// Recompute daily site metrics (yesterday by default)
    Metrics {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        site: Option<String>,
    },
    /// Delete processed raw events past retention
    Cleanup {
        #[arg(long)]
        retention_days: Option<u32>,
        #[arg(long)]
        cleanup_metrics: bool,
        #[arg(long)]
        metrics_retention_days: Option<u32>,
    },
    /// Print backlog, table sizes and counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    let cli = Cli::parse();

    let mut config = load_config()?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let store = Store::connect(config.database.clone())
        .await
        .context("Failed to open store")?;
    check_health(&store).await;

    let pipeline = Pipeline::new(store.clone(), config.pipeline.clone());

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, pipeline).await,
        Command::Run { batch_size } => {
            let report = pipeline.run_pipeline(batch_size).await?;
            print_json(&report)?;
            if report.status == RunStatus::PartialFailure {
                bail!("pipeline run finished with failed steps");
            }
            Ok(())
        }
        Command::Process {
            event_type,
            batch_size,
        } => {
            let kind: EventKind = event_type.parse()?;
            let report = pipeline.process(kind, batch_size).await?;
            print_json(&report)?;
            match report.error {
                Some(e) => bail!("{kind} step failed: {e}"),
                None => Ok(()),
            }
        }
        Command::Metrics { date, site } => {
            let report = pipeline.calculate_daily_metrics(date, site.as_deref()).await?;
            print_json(&report)
        }
        Command::Cleanup {
            retention_days,
            cleanup_metrics,
            metrics_retention_days,
        } => {
            let policy = RetentionPolicy::new(
                retention_days.unwrap_or(config.pipeline.retention_days),
                metrics_retention_days.unwrap_or(config.pipeline.metrics_retention_days),
            )?;
            let report = pipeline.cleanup(&policy, cleanup_metrics).await?;
            print_json(&report)
        }
        Command::Status => {
            let status = pipeline.status().await?;
            print_json(&status)
        }
    };

    store.close().await;
    outcome
}

async fn serve(config: &Config, pipeline: Pipeline) -> Result<()> {
    info!("Starting clickstream ETL v{}", env!("CARGO_PKG_VERSION"));

    let app = router(AppState::new(pipeline));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}

/// Load configuration from files and environment.
///
/// Environment keys look like `ETL__DATABASE__URL` or `ETL__PIPELINE__BATCH_SIZE`.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::with_prefix("ETL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Probe the store once on startup.
async fn check_health(store: &Store) {
    if check_connection(store).await {
        health().database.set_healthy();
        info!(url = %store.config().url, "Store connection: healthy");
    } else {
        health().database.set_unhealthy("Connection failed");
        error!(url = %store.config().url, "Store connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
