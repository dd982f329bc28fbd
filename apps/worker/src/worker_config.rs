use std::time::Duration;

use chrono::TimeDelta;
use leasehold_core::{AppError, AppResult};
use leasehold_domain::{
    LOCKED_BY_MAX_LENGTH, LockConfiguration, LockName, parse_iso8601_duration,
};
use leasehold_infrastructure::{LeaseTableName, LeaseTimeSource, resolve_host_identity};

const DEFAULT_JOB_NAME: &str = "TaskSchedulerManager_scheduledTask";
const DEFAULT_JOB_INTERVAL: &str = "PT5M";
const DEFAULT_LOCK_AT_LEAST_FOR: &str = "PT2M";
const DEFAULT_LOCK_AT_MOST_FOR: &str = "PT4M";

/// Backing store for the lease table.
#[derive(Debug, Clone)]
pub enum LeaseStoreConfig {
    Postgres {
        database_url: String,
        table_name: LeaseTableName,
        time_source: LeaseTimeSource,
    },
    Memory,
}

#[derive(Debug, Clone)]
pub struct WorkerJobConfig {
    pub lock: LockConfiguration,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub store: LeaseStoreConfig,
    pub worker_id: String,
    pub job: WorkerJobConfig,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let lookup = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let store = match lookup("LEASE_STORE").as_deref().unwrap_or("postgres") {
            "postgres" => LeaseStoreConfig::Postgres {
                database_url: lookup("DATABASE_URL").ok_or_else(|| {
                    AppError::Validation("DATABASE_URL is required".to_owned())
                })?,
                table_name: lookup("LEASE_TABLE_NAME")
                    .map(LeaseTableName::new)
                    .transpose()?
                    .unwrap_or_default(),
                time_source: if parse_bool(
                    "LEASE_USE_DB_TIME",
                    lookup("LEASE_USE_DB_TIME"),
                    false,
                )? {
                    LeaseTimeSource::Database
                } else {
                    LeaseTimeSource::Client
                },
            },
            "memory" => LeaseStoreConfig::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "invalid LEASE_STORE value '{other}', expected 'postgres' or 'memory'"
                )));
            }
        };

        let worker_id = lookup("WORKER_ID").unwrap_or_else(resolve_host_identity);
        if worker_id.chars().count() > LOCKED_BY_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "worker id exceeds {LOCKED_BY_MAX_LENGTH} characters, set a shorter WORKER_ID"
            )));
        }

        let lock_at_least_for = parse_duration(
            "WORKER_LOCK_AT_LEAST_FOR",
            lookup("WORKER_LOCK_AT_LEAST_FOR")
                .as_deref()
                .unwrap_or(DEFAULT_LOCK_AT_LEAST_FOR),
        )?;
        let lock_at_most_for = parse_duration(
            "WORKER_LOCK_AT_MOST_FOR",
            lookup("WORKER_LOCK_AT_MOST_FOR")
                .as_deref()
                .unwrap_or(DEFAULT_LOCK_AT_MOST_FOR),
        )?;

        let job_name = LockName::new(
            lookup("WORKER_JOB_NAME").unwrap_or_else(|| DEFAULT_JOB_NAME.to_owned()),
        )?;
        let lock = LockConfiguration::new(job_name, lock_at_least_for, lock_at_most_for)?;

        let interval = parse_duration(
            "WORKER_JOB_INTERVAL",
            lookup("WORKER_JOB_INTERVAL")
                .as_deref()
                .unwrap_or(DEFAULT_JOB_INTERVAL),
        )?
        .to_std()
        .map_err(|error| {
            AppError::Validation(format!("invalid WORKER_JOB_INTERVAL value: {error}"))
        })?;

        if interval.is_zero() {
            return Err(AppError::Validation(
                "WORKER_JOB_INTERVAL must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            store,
            worker_id,
            job: WorkerJobConfig { lock, interval },
        })
    }

    pub fn database_url(&self) -> AppResult<&str> {
        match &self.store {
            LeaseStoreConfig::Postgres { database_url, .. } => Ok(database_url.as_str()),
            LeaseStoreConfig::Memory => Err(AppError::Validation(
                "this command requires LEASE_STORE=postgres".to_owned(),
            )),
        }
    }
}

fn parse_duration(name: &str, value: &str) -> AppResult<TimeDelta> {
    parse_iso8601_duration(value)
        .map_err(|error| AppError::Validation(format!("invalid {name} value: {error}")))
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> AppResult<bool> {
    match value {
        None => Ok(default),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(AppError::Validation(format!(
            "invalid {name} value '{value}', expected true or false"
        ))),
    }
}
