//! Agro Worker - field survey ingestion and bulk job processing
//!
//! Connects to PostgreSQL and NATS, answers request/reply subjects and runs
//! the bulk-applications job worker in the same process.

mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod repository;
mod services;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::PgStore;
use crate::services::bulk_job_worker::BulkJobWorker;
use crate::services::csv_parser::CsvParser;
use crate::services::ids::{IdentifierSource, UuidSource};
use crate::services::ingestion::SurveyIngestionService;
use crate::services::job_service::JobService;
use crate::services::parcel::ParcelService;
use crate::services::queue::{JetStreamQueue, QueueTransport};

fn init_logging() -> WorkerGuard {
    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "worker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,agro_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Migrate => migrate().await,
        Command::CheckCsv { file } => check_csv(&file),
        Command::Ingest { file } => ingest(&file).await,
    }
}

async fn connect_nats(config: &Config) -> Result<async_nats::Client> {
    let client = match config.nats_credentials() {
        Some((user, password)) => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        None => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);
    Ok(client)
}

async fn serve() -> Result<()> {
    info!("Starting Agro Worker...");

    let config = Config::from_env()?;
    info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;

    let nats_client = connect_nats(&config).await?;

    let store = Arc::new(PgStore::new(pool));
    let ids: Arc<dyn IdentifierSource> = Arc::new(UuidSource);
    let queue: Arc<dyn QueueTransport> =
        Arc::new(JetStreamQueue::new(nats_client.clone(), config.queue_poll_interval).await?);

    let ingestion = Arc::new(SurveyIngestionService::new(ids.clone(), store.clone(), store.clone()));
    let job_service = Arc::new(JobService::new(ids, store.clone(), queue.clone()));
    let worker = BulkJobWorker::new(
        store.clone(),
        queue,
        ParcelService::new(store),
        config.worker_config(),
    );

    let cancel = CancellationToken::new();
    let worker_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    let result = tokio::select! {
        result = handlers::start_handlers(nats_client, ingestion, job_service) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    cancel.cancel();
    if let Err(e) = worker_handle.await {
        error!("Worker task failed: {}", e);
    }

    if let Err(ref e) = result {
        error!("Handler error: {}", e);
    }
    result
}

async fn migrate() -> Result<()> {
    let config = Config::from_env()?;
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await
}

/// Dry-run parse; prints what would be ingested
fn check_csv(file: &Path) -> Result<()> {
    let raw = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let parser = CsvParser::new(Arc::new(UuidSource));
    let result = parser.parse(&raw, Uuid::nil())?;

    println!("{}: {} rows parsed, {} rows rejected", file.display(), result.total_rows, result.errors.len());
    for parcel in &result.parcels {
        let pests: Vec<String> = parcel
            .pests
            .present_pests()
            .into_iter()
            .map(|name| match parcel.pests.get(&name).and_then(|entry| entry.level) {
                Some(level) => format!("{} ({:?})", name, level),
                None => name,
            })
            .collect();
        println!(
            "  {} farm={} block={} area={} pests=[{}]",
            parcel.fields.external_id,
            parcel.fields.farm_code,
            parcel.fields.block,
            parcel.fields.total_area,
            pests.join(", ")
        );
    }
    for row_error in &result.errors {
        println!("  line {}: {}", row_error.line, row_error.message);
    }

    Ok(())
}

async fn ingest(file: &Path) -> Result<()> {
    let config = Config::from_env()?;
    let raw = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let ingestion = SurveyIngestionService::new(Arc::new(UuidSource), store.clone(), store);
    let response = ingestion.ingest(&filename, &raw).await?;

    println!(
        "Survey {} ingested: {} parcels, {} rows rejected",
        response.survey.id,
        response.survey.total_rows,
        response.row_errors.len()
    );
    for row_error in &response.row_errors {
        println!("  line {}: {}", row_error.line, row_error.message);
    }

    Ok(())
}
