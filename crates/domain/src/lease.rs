use chrono::{DateTime, TimeDelta, Utc};
use leasehold_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::duration::format_iso8601_duration;

/// Maximum lock name length accepted by the lease table's primary key column.
pub const LOCK_NAME_MAX_LENGTH: usize = 64;

/// Maximum holder identity length accepted by the `locked_by` column.
pub const LOCKED_BY_MAX_LENGTH: usize = 255;

/// Unique name of one protected task and primary key of its lease row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockName(NonEmptyString);

impl LockName {
    /// Creates a validated lock name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = NonEmptyString::new(value).map_err(|_| {
            AppError::Validation("lock name must not be empty or whitespace".to_owned())
        })?;

        if value.as_str().chars().count() > LOCK_NAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "lock name '{}' exceeds {LOCK_NAME_MAX_LENGTH} characters",
                value.as_str()
            )));
        }

        Ok(Self(value))
    }

    /// Returns the lock name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for LockName {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Persisted state of one named lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Protected task name.
    pub name: LockName,
    /// Instant until which the lease is held.
    pub lock_until: DateTime<Utc>,
    /// Instant the current holder acquired the lease.
    pub locked_at: DateTime<Utc>,
    /// Identity of the node that last acquired the lease.
    pub locked_by: String,
}

impl Lease {
    /// Returns true while the lease blocks other acquirers.
    #[must_use]
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        now < self.lock_until
    }
}

/// Hold bounds for one named lock.
///
/// `lock_at_most_for` bounds how long a crashed holder can block the lock.
/// `lock_at_least_for` keeps the lock held after a fast run so that nodes with
/// a short poll interval do not execute the same task twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfiguration {
    name: LockName,
    lock_at_least_for: TimeDelta,
    lock_at_most_for: TimeDelta,
}

impl LockConfiguration {
    /// Creates a validated lock configuration.
    pub fn new(
        name: LockName,
        lock_at_least_for: TimeDelta,
        lock_at_most_for: TimeDelta,
    ) -> AppResult<Self> {
        if lock_at_most_for <= TimeDelta::zero() {
            return Err(AppError::Validation(format!(
                "lock_at_most_for for '{name}' must be greater than zero"
            )));
        }

        if lock_at_least_for < TimeDelta::zero() {
            return Err(AppError::Validation(format!(
                "lock_at_least_for for '{name}' must not be negative"
            )));
        }

        if lock_at_least_for > lock_at_most_for {
            return Err(AppError::Validation(format!(
                "lock_at_least_for ({}) for '{name}' must not exceed lock_at_most_for ({})",
                format_iso8601_duration(lock_at_least_for),
                format_iso8601_duration(lock_at_most_for),
            )));
        }

        Ok(Self {
            name,
            lock_at_least_for,
            lock_at_most_for,
        })
    }

    /// Returns the lock name.
    #[must_use]
    pub fn name(&self) -> &LockName {
        &self.name
    }

    /// Returns the minimum hold duration.
    #[must_use]
    pub fn lock_at_least_for(&self) -> TimeDelta {
        self.lock_at_least_for
    }

    /// Returns the maximum hold duration.
    #[must_use]
    pub fn lock_at_most_for(&self) -> TimeDelta {
        self.lock_at_most_for
    }
}

/// Computes the acquisition expiry for one lock.
pub fn lock_until(
    name: &LockName,
    now: DateTime<Utc>,
    lock_at_most_for: TimeDelta,
) -> AppResult<DateTime<Utc>> {
    now.checked_add_signed(lock_at_most_for).ok_or_else(|| {
        AppError::Validation(format!(
            "lock_until for '{name}' overflows the supported timestamp range"
        ))
    })
}

/// Computes the release expiry for one lock.
pub fn unlock_time(
    name: &LockName,
    started_at: DateTime<Utc>,
    lock_at_least_for: TimeDelta,
    now: DateTime<Utc>,
) -> AppResult<DateTime<Utc>> {
    let minimum_unlock_time = started_at
        .checked_add_signed(lock_at_least_for)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "unlock time for '{name}' overflows the supported timestamp range"
            ))
        })?;

    Ok(minimum_unlock_time.max(now))
}
