use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use leasehold_core::{AppError, AppResult};
use leasehold_domain::{Lease, LockConfiguration, LockName, lock_until, unlock_time};
use tracing::{debug, warn};

use crate::lease_ports::{AcquireLeaseInput, Clock, LeaseRepository, ReleaseLeaseInput};


/// Result of one exclusive execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The lease was acquired and the task ran.
    Executed,
    /// Another node holds the lease, or the minimum hold has not elapsed.
    Skipped,
}

/// Lease lock manager running tasks on at most one node at a time.
///
/// All exclusion happens in the shared lease table; the service keeps no
/// cross-request state besides the holder identity.
#[derive(Clone)]
pub struct LeaseLockService {
    repository: Arc<dyn LeaseRepository>,
    clock: Arc<dyn Clock>,
    holder_id: String,
}

impl LeaseLockService {
    /// Creates a lease lock service for one node.
    #[must_use]
    pub fn new(
        repository: Arc<dyn LeaseRepository>,
        clock: Arc<dyn Clock>,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            clock,
            holder_id: holder_id.into(),
        }
    }

    /// Returns the identity written to `locked_by`.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        self.holder_id.as_str()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Attempts to acquire the named lease at `now` for `lock_at_most_for`.
    ///
    /// Returns false when the lease is held elsewhere or a peer created the
    /// row first. Store failures are returned as errors.
    pub async fn try_acquire(
        &self,
        name: &LockName,
        now: DateTime<Utc>,
        lock_at_most_for: TimeDelta,
    ) -> AppResult<bool> {
        if lock_at_most_for <= TimeDelta::zero() {
            return Err(AppError::Validation(format!(
                "lock_at_most_for for '{name}' must be greater than zero"
            )));
        }

        let input = AcquireLeaseInput {
            name: name.clone(),
            now,
            lock_until: lock_until(name, now, lock_at_most_for)?,
            lock_at_most_for,
            locked_by: self.holder_id.clone(),
        };

        if self.repository.update_if_expired(&input).await? {
            debug!(lock_name = %name, lock_until = %input.lock_until, "lease re-acquired");
            return Ok(true);
        }

        // Zero rows updated: either the row is missing or it is still held.
        let inserted = self.repository.insert_if_absent(&input).await?;
        if inserted {
            debug!(lock_name = %name, lock_until = %input.lock_until, "lease created");
        }

        Ok(inserted)
    }

    /// Releases the named lease, keeping it held until at least
    /// `started_at + lock_at_least_for`.
    ///
    /// Returns the expiry computed from this node's clock. Stores that
    /// evaluate time on the database side compute their own value, so the
    /// returned instant is only an estimate of what was written there.
    pub async fn release(
        &self,
        name: &LockName,
        started_at: DateTime<Utc>,
        lock_at_least_for: TimeDelta,
    ) -> AppResult<DateTime<Utc>> {
        let now = self.clock.now();
        let unlock_at = unlock_time(name, started_at, lock_at_least_for, now)?;

        self.repository
            .set_lock_until(&ReleaseLeaseInput {
                name: name.clone(),
                started_at,
                lock_at_least_for,
                unlock_at,
            })
            .await?;

        debug!(lock_name = %name, unlock_at = %unlock_at, "lease released");
        Ok(unlock_at)
    }

    /// Runs `task` while holding the configured lease.
    ///
    /// Returns [`ExecutionOutcome::Skipped`] without running the task when the
    /// lease is unavailable. The lease is released whether the task succeeds or
    /// fails; a failing task releases relative to the acquisition instant and
    /// its error is returned unchanged.
    pub async fn run_exclusively<F, Fut, E>(
        &self,
        configuration: &LockConfiguration,
        task: F,
    ) -> Result<ExecutionOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<AppError>,
    {
        let name = configuration.name();
        let acquired_at = self.clock.now();

        if !self
            .try_acquire(name, acquired_at, configuration.lock_at_most_for())
            .await?
        {
            debug!(lock_name = %name, "lease unavailable, skipping execution");
            return Ok(ExecutionOutcome::Skipped);
        }

        let task_started_at = self.clock.now();
        match task().await {
            Ok(()) => {
                self.release(name, task_started_at, configuration.lock_at_least_for())
                    .await?;
                Ok(ExecutionOutcome::Executed)
            }
            Err(error) => {
                if let Err(release_error) = self
                    .release(name, acquired_at, configuration.lock_at_least_for())
                    .await
                {
                    warn!(
                        lock_name = %name,
                        error = %release_error,
                        "failed to release lease after task failure"
                    );
                }
                Err(error)
            }
        }
    }

    /// Loads the current lease row for diagnostics.
    pub async fn find_lease(&self, name: &LockName) -> AppResult<Option<Lease>> {
        self.repository.find_lease(name).await
    }
}
