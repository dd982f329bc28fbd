//! Leasehold scheduler worker runtime.

#![forbid(unsafe_code)]

mod worker_config;

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leasehold_application::{
    Clock, LeaseLockService, LeaseRepository, ScheduledJob, ScheduledJobRunner, ScheduledTask,
};
use leasehold_core::{AppError, AppResult};
use leasehold_domain::{Lease, LockName, format_iso8601_duration};
use leasehold_infrastructure::{InMemoryLeaseRepository, PostgresLeaseRepository, SystemClock};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::{LeaseStoreConfig, WorkerConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerCommand {
    Run,
    Migrate,
    Status(String),
}

#[derive(Debug, Serialize)]
struct LeaseStatusResponse {
    name: String,
    lock_until: DateTime<Utc>,
    locked_at: DateTime<Utc>,
    locked_by: String,
    held: bool,
}

/// Task executed on whichever node holds the lease for the round.
struct LoggingTask {
    worker_id: String,
}

#[async_trait]
impl ScheduledTask for LoggingTask {
    async fn run(&self) -> AppResult<()> {
        info!(worker_id = %self.worker_id, "executing scheduled task");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = WorkerCommand::parse(env::args().skip(1))?;
    let config = WorkerConfig::load()?;

    match command {
        WorkerCommand::Migrate => {
            let pool = connect_pool(config.database_url()?).await?;
            run_migrations(&pool).await?;
            info!("lease table migrations applied");
            Ok(())
        }
        WorkerCommand::Status(name) => print_lease_status(&config, name).await,
        WorkerCommand::Run => run_scheduler(config).await,
    }
}

impl WorkerCommand {
    fn parse(mut args: impl Iterator<Item = String>) -> AppResult<Self> {
        let command = match args.next().as_deref() {
            None | Some("run") => Self::Run,
            Some("migrate") => Self::Migrate,
            Some("status") => Self::Status(args.next().ok_or_else(|| {
                AppError::Validation("usage: leasehold-worker status <lock-name>".to_owned())
            })?),
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "unknown command '{other}', expected run, migrate or status"
                )));
            }
        };

        if let Some(extra) = args.next() {
            return Err(AppError::Validation(format!(
                "unexpected argument '{extra}'"
            )));
        }

        Ok(command)
    }
}

async fn run_scheduler(config: WorkerConfig) -> AppResult<()> {
    let lock_service = build_lock_service(&config).await?;
    let runner = ScheduledJobRunner::new(lock_service);
    let job = ScheduledJob::new(
        config.job.lock.clone(),
        config.job.interval,
        Arc::new(LoggingTask {
            worker_id: config.worker_id.clone(),
        }),
    )?;

    info!(
        worker_id = %config.worker_id,
        lock_name = %config.job.lock.name(),
        lock_at_least_for = %format_iso8601_duration(config.job.lock.lock_at_least_for()),
        lock_at_most_for = %format_iso8601_duration(config.job.lock.lock_at_most_for()),
        interval = ?config.job.interval,
        "leasehold-worker started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for shutdown signal");
                // Keep the sender alive so the scheduler keeps running.
                std::future::pending::<()>().await;
            }
        }
    });

    runner.run_until_shutdown(vec![job], shutdown_rx).await;
    info!(worker_id = %config.worker_id, "leasehold-worker stopped");
    Ok(())
}

async fn print_lease_status(config: &WorkerConfig, name: String) -> AppResult<()> {
    config.database_url()?;
    let name = LockName::new(name)?;
    let lock_service = build_lock_service(config).await?;
    let lease = lock_service
        .find_lease(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("lease '{name}' does not exist")))?;

    let status = LeaseStatusResponse::from_lease(lease, SystemClock.now());
    let rendered = serde_json::to_string_pretty(&status).map_err(|error| {
        AppError::Internal(format!("failed to render lease status: {error}"))
    })?;
    println!("{rendered}");

    Ok(())
}

impl LeaseStatusResponse {
    fn from_lease(lease: Lease, now: DateTime<Utc>) -> Self {
        Self {
            held: lease.is_held_at(now),
            name: lease.name.as_str().to_owned(),
            lock_until: lease.lock_until,
            locked_at: lease.locked_at,
            locked_by: lease.locked_by,
        }
    }
}

async fn build_lock_service(config: &WorkerConfig) -> AppResult<LeaseLockService> {
    let repository = build_repository(config).await?;
    Ok(LeaseLockService::new(
        repository,
        Arc::new(SystemClock),
        config.worker_id.clone(),
    ))
}

async fn build_repository(config: &WorkerConfig) -> AppResult<Arc<dyn LeaseRepository>> {
    match &config.store {
        LeaseStoreConfig::Postgres {
            database_url,
            table_name,
            time_source,
        } => {
            let pool = connect_pool(database_url.as_str()).await?;
            Ok(Arc::new(PostgresLeaseRepository::with_options(
                pool,
                table_name.clone(),
                *time_source,
            )))
        }
        LeaseStoreConfig::Memory => {
            warn!("using in-memory lease store, leases are not shared across processes");
            Ok(Arc::new(InMemoryLeaseRepository::new()))
        }
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
