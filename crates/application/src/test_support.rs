use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use leasehold_core::{AppError, AppResult};
use leasehold_domain::{Lease, LockConfiguration, LockName};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::lease_ports::{AcquireLeaseInput, Clock, LeaseRepository, ReleaseLeaseInput};

pub(crate) fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, second)
        .single()
        .unwrap_or_else(|| panic!("invalid test timestamp"))
}

pub(crate) fn lock_name(value: &str) -> LockName {
    LockName::new(value).unwrap_or_else(|error| panic!("{error}"))
}

pub(crate) fn configuration(
    name: &str,
    at_least_for: TimeDelta,
    at_most_for: TimeDelta,
) -> LockConfiguration {
    LockConfiguration::new(lock_name(name), at_least_for, at_most_for)
        .unwrap_or_else(|error| panic!("{error}"))
}

pub(crate) struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub(crate) fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub(crate) fn advance(&self, delta: TimeDelta) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Wall clock driven by tokio's clock, so paused-time tests control it.
pub(crate) struct TokioClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    pub(crate) fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.origin + TimeDelta::from_std(self.started.elapsed()).unwrap_or_default()
    }
}

#[derive(Default)]
pub(crate) struct FakeLeaseRepository {
    leases: Mutex<HashMap<String, Lease>>,
    fail_acquire: AtomicBool,
    fail_release: AtomicBool,
}

impl FakeLeaseRepository {
    pub(crate) fn fail_acquire(&self) {
        self.fail_acquire.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn lease(&self, name: &str) -> Option<Lease> {
        self.leases.lock().await.get(name).cloned()
    }
}

#[async_trait]
impl LeaseRepository for FakeLeaseRepository {
    async fn update_if_expired(&self, input: &AcquireLeaseInput) -> AppResult<bool> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(AppError::Internal("lease store unavailable".to_owned()));
        }

        let mut leases = self.leases.lock().await;
        let Some(lease) = leases.get_mut(input.name.as_str()) else {
            return Ok(false);
        };

        if lease.lock_until > input.now {
            return Ok(false);
        }

        lease.lock_until = input.lock_until;
        lease.locked_at = input.now;
        lease.locked_by = input.locked_by.clone();
        Ok(true)
    }

    async fn insert_if_absent(&self, input: &AcquireLeaseInput) -> AppResult<bool> {
        // Yield so concurrent first acquisitions interleave between the two
        // statements the way separate store round-trips would.
        tokio::task::yield_now().await;

        let mut leases = self.leases.lock().await;
        if leases.contains_key(input.name.as_str()) {
            return Ok(false);
        }

        leases.insert(
            input.name.as_str().to_owned(),
            Lease {
                name: input.name.clone(),
                lock_until: input.lock_until,
                locked_at: input.now,
                locked_by: input.locked_by.clone(),
            },
        );
        Ok(true)
    }

    async fn set_lock_until(&self, input: &ReleaseLeaseInput) -> AppResult<()> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(AppError::Internal("lease store unavailable".to_owned()));
        }

        if let Some(lease) = self.leases.lock().await.get_mut(input.name.as_str()) {
            lease.lock_until = input.unlock_at;
        }

        Ok(())
    }

    async fn find_lease(&self, name: &LockName) -> AppResult<Option<Lease>> {
        Ok(self.lease(name.as_str()).await)
    }
}
