use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leasehold_core::{AppError, AppResult};
use leasehold_domain::LockConfiguration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::lease_lock_service::{ExecutionOutcome, LeaseLockService};


/// Unit of work executed by the scheduler under a named lease.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Runs the task once.
    async fn run(&self) -> AppResult<()>;
}

/// A task bound to its lock configuration and poll interval.
#[derive(Clone)]
pub struct ScheduledJob {
    configuration: LockConfiguration,
    interval: Duration,
    task: Arc<dyn ScheduledTask>,
}

impl ScheduledJob {
    /// Creates a validated scheduled job.
    pub fn new(
        configuration: LockConfiguration,
        interval: Duration,
        task: Arc<dyn ScheduledTask>,
    ) -> AppResult<Self> {
        if interval.is_zero() {
            return Err(AppError::Validation(format!(
                "schedule interval for '{}' must be greater than zero",
                configuration.name()
            )));
        }

        Ok(Self {
            configuration,
            interval,
            task,
        })
    }
}

/// Periodic task runner. Rounds fire on wall-clock multiples of each job's
/// interval, so every node polls at the same instants and the lease decides
/// which node executes each round.
#[derive(Clone)]
pub struct ScheduledJobRunner {
    lock_service: LeaseLockService,
}

impl ScheduledJobRunner {
    /// Creates a runner that guards jobs with the given lock service.
    #[must_use]
    pub fn new(lock_service: LeaseLockService) -> Self {
        Self { lock_service }
    }

    /// Runs one scheduling round for the job.
    pub async fn run_once(&self, job: &ScheduledJob) -> AppResult<ExecutionOutcome> {
        let name = job.configuration.name();
        let task = Arc::clone(&job.task);
        let result = self
            .lock_service
            .run_exclusively(&job.configuration, || async move { task.run().await })
            .await;

        match &result {
            Ok(ExecutionOutcome::Executed) => info!(
                lock_name = %name,
                locked_by = %self.lock_service.holder_id(),
                "scheduled job executed"
            ),
            Ok(ExecutionOutcome::Skipped) => {
                debug!(lock_name = %name, "scheduled job skipped, lease unavailable");
            }
            Err(error) => warn!(
                lock_name = %name,
                error = %error,
                "scheduled job failed"
            ),
        }

        result
    }

    /// Polls every job on its interval until `shutdown` turns true or its
    /// sender is dropped. The first round waits for the next multiple of the
    /// interval since the Unix epoch. Missed ticks are skipped, not replayed,
    /// so rounds stay on that grid.
    pub async fn run_until_shutdown(
        &self,
        jobs: Vec<ScheduledJob>,
        shutdown: watch::Receiver<bool>,
    ) {
        let mut workers = JoinSet::new();
        for job in jobs {
            let runner = self.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { runner.poll_job(job, shutdown).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(error) = joined {
                warn!(error = %error, "scheduled job loop terminated abnormally");
            }
        }
    }

    async fn poll_job(&self, job: ScheduledJob, mut shutdown: watch::Receiver<bool>) {
        let start = Instant::now() + first_tick_delay(self.lock_service.now(), job.interval);
        let mut interval = tokio::time::interval_at(start, job.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    // Failures are logged by run_once; the next tick retries.
                    let _ = self.run_once(&job).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(lock_name = %job.configuration.name(), "scheduled job loop stopped");
    }
}

/// Time left until the next wall-clock multiple of `interval`, zero when `now`
/// sits exactly on one.
fn first_tick_delay(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    if interval_millis == 0 {
        return Duration::ZERO;
    }

    let elapsed_millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    match elapsed_millis % interval_millis {
        0 => Duration::ZERO,
        remainder => Duration::from_millis(interval_millis - remainder),
    }
}
