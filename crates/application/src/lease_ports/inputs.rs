use chrono::{DateTime, TimeDelta, Utc};
use leasehold_domain::LockName;

/// Values written by one acquisition attempt.
///
/// Adapters evaluating time on the store side use `lock_at_most_for` and
/// ignore the client timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireLeaseInput {
    /// Lock being acquired.
    pub name: LockName,
    /// Client instant of the attempt.
    pub now: DateTime<Utc>,
    /// Expiry to store: `now + lock_at_most_for`.
    pub lock_until: DateTime<Utc>,
    /// Maximum hold duration.
    pub lock_at_most_for: TimeDelta,
    /// Identity recorded as holder.
    pub locked_by: String,
}

/// Values written by one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLeaseInput {
    /// Lock being released.
    pub name: LockName,
    /// Reference instant the minimum hold is measured from.
    pub started_at: DateTime<Utc>,
    /// Minimum hold duration.
    pub lock_at_least_for: TimeDelta,
    /// Expiry to store: `max(started_at + lock_at_least_for, now)`.
    pub unlock_at: DateTime<Utc>,
}
