use std::collections::HashMap;

use async_trait::async_trait;
use leasehold_application::{AcquireLeaseInput, LeaseRepository, ReleaseLeaseInput};
use leasehold_core::AppResult;
use leasehold_domain::{Lease, LockName};
use tokio::sync::RwLock;

/// In-memory lease table for single-process runs and tests.
#[derive(Default)]
pub struct InMemoryLeaseRepository {
    leases: RwLock<HashMap<String, Lease>>,
}

impl InMemoryLeaseRepository {
    /// Creates an empty in-memory lease table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseRepository for InMemoryLeaseRepository {
    async fn update_if_expired(&self, input: &AcquireLeaseInput) -> AppResult<bool> {
        let mut leases = self.leases.write().await;
        let Some(lease) = leases
            .get_mut(input.name.as_str())
            .filter(|lease| lease.lock_until <= input.now)
        else {
            return Ok(false);
        };

        lease.lock_until = input.lock_until;
        lease.locked_at = input.now;
        lease.locked_by = input.locked_by.clone();
        Ok(true)
    }

    async fn insert_if_absent(&self, input: &AcquireLeaseInput) -> AppResult<bool> {
        let mut leases = self.leases.write().await;
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
        if let Some(lease) = self.leases.write().await.get_mut(input.name.as_str()) {
            lease.lock_until = input.unlock_at;
        }

        Ok(())
    }

    async fn find_lease(&self, name: &LockName) -> AppResult<Option<Lease>> {
        Ok(self.leases.read().await.get(name.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use leasehold_application::{AcquireLeaseInput, LeaseRepository, ReleaseLeaseInput};
    use leasehold_domain::LockName;

    use super::InMemoryLeaseRepository;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, second)
            .single()
            .unwrap_or_else(|| panic!("invalid test timestamp"))
    }

    fn acquire_input(holder: &str, now: DateTime<Utc>) -> AcquireLeaseInput {
        AcquireLeaseInput {
            name: LockName::new("job-x").unwrap_or_else(|error| panic!("{error}")),
            now,
            lock_until: now + TimeDelta::minutes(4),
            lock_at_most_for: TimeDelta::minutes(4),
            locked_by: holder.to_owned(),
        }
    }

    #[tokio::test]
    async fn update_only_rearms_expired_rows() {
        let repository = InMemoryLeaseRepository::new();

        let missing = repository
            .update_if_expired(&acquire_input("node-a", at(10, 0, 0)))
            .await;
        assert!(matches!(missing, Ok(false)));

        let created = repository
            .insert_if_absent(&acquire_input("node-a", at(10, 0, 0)))
            .await;
        assert!(matches!(created, Ok(true)));

        let held = repository
            .update_if_expired(&acquire_input("node-b", at(10, 3, 0)))
            .await;
        assert!(matches!(held, Ok(false)));

        let expired = repository
            .update_if_expired(&acquire_input("node-b", at(10, 4, 0)))
            .await;
        assert!(matches!(expired, Ok(true)));

        let name = LockName::new("job-x").unwrap_or_else(|error| panic!("{error}"));
        let lease = repository.find_lease(&name).await.unwrap_or_default();
        assert_eq!(lease.map(|lease| lease.locked_by), Some("node-b".to_owned()));
    }

    #[tokio::test]
    async fn duplicate_insert_never_overwrites() {
        let repository = InMemoryLeaseRepository::new();

        let first = repository
            .insert_if_absent(&acquire_input("node-a", at(10, 0, 0)))
            .await;
        let second = repository
            .insert_if_absent(&acquire_input("node-b", at(10, 0, 1)))
            .await;

        assert!(matches!(first, Ok(true)));
        assert!(matches!(second, Ok(false)));

        let name = LockName::new("job-x").unwrap_or_else(|error| panic!("{error}"));
        let lease = repository.find_lease(&name).await.unwrap_or_default();
        assert_eq!(lease.map(|lease| lease.locked_by), Some("node-a".to_owned()));
    }

    #[tokio::test]
    async fn concurrent_first_acquisitions_elect_exactly_one_holder() {
        let repository = Arc::new(InMemoryLeaseRepository::new());
        let mut attempts = Vec::new();

        for index in 0..8 {
            let repository = repository.clone();
            attempts.push(tokio::spawn(async move {
                let input = acquire_input(&format!("node-{index}"), at(10, 0, 0));
                match repository.update_if_expired(&input).await {
                    Ok(true) => true,
                    Ok(false) => matches!(repository.insert_if_absent(&input).await, Ok(true)),
                    Err(error) => panic!("{error}"),
                }
            }));
        }

        let mut winners = 0;
        for attempt in attempts {
            if matches!(attempt.await, Ok(true)) {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn release_of_unknown_lease_is_ignored() {
        let repository = InMemoryLeaseRepository::new();
        let name = LockName::new("job-x").unwrap_or_else(|error| panic!("{error}"));

        let released = repository
            .set_lock_until(&ReleaseLeaseInput {
                name: name.clone(),
                started_at: at(10, 0, 0),
                lock_at_least_for: TimeDelta::minutes(2),
                unlock_at: at(10, 2, 0),
            })
            .await;

        assert!(released.is_ok());
        assert!(matches!(repository.find_lease(&name).await, Ok(None)));
    }
}
