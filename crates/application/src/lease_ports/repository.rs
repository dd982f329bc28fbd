use async_trait::async_trait;
use leasehold_core::AppResult;
use leasehold_domain::{Lease, LockName};

use super::inputs::{AcquireLeaseInput, ReleaseLeaseInput};

/// Shared lease table port.
///
/// Every method maps to one statement with single-row atomicity; no
/// multi-statement transaction is expected from implementations.
#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Re-arms an existing lease when `lock_until <= now` and returns whether
    /// a row was updated.
    async fn update_if_expired(&self, input: &AcquireLeaseInput) -> AppResult<bool>;

    /// Creates the lease row when no row exists for the name.
    ///
    /// Returns false when the row already exists, including when a concurrent
    /// peer created it first. Existing rows are never overwritten.
    async fn insert_if_absent(&self, input: &AcquireLeaseInput) -> AppResult<bool>;

    /// Unconditionally stores the release expiry for the named lease.
    async fn set_lock_until(&self, input: &ReleaseLeaseInput) -> AppResult<()>;

    /// Loads one lease row for diagnostics.
    async fn find_lease(&self, name: &LockName) -> AppResult<Option<Lease>>;
}
