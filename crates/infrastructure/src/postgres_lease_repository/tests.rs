use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use leasehold_application::{Clock, LeaseLockService, LeaseRepository};
use leasehold_domain::LockName;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::{LeaseTableName, LeaseTimeSource, PostgresLeaseRepository};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres lease tests: {error}");
    }

    Some(pool)
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, second)
        .single()
        .unwrap_or_else(|| panic!("invalid test timestamp"))
}

fn unique_lock_name(prefix: &str) -> LockName {
    LockName::new(format!("{prefix}-{}", uuid::Uuid::new_v4()))
        .unwrap_or_else(|error| panic!("{error}"))
}

fn node(
    repository: &Arc<PostgresLeaseRepository>,
    holder_id: &str,
    now: DateTime<Utc>,
) -> LeaseLockService {
    LeaseLockService::new(repository.clone(), Arc::new(FixedClock(now)), holder_id)
}

#[tokio::test]
async fn client_time_leases_follow_acquire_release_cycle() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = Arc::new(PostgresLeaseRepository::new(pool));
    let name = unique_lock_name("job-x");

    let acquired = node(&repository, "node-a", at(10, 0, 0))
        .try_acquire(&name, at(10, 0, 0), TimeDelta::minutes(4))
        .await;
    assert!(matches!(acquired, Ok(true)));

    let lease = repository.find_lease(&name).await;
    assert!(lease.is_ok());
    let lease = lease
        .unwrap_or_default()
        .unwrap_or_else(|| panic!("lease row missing"));
    assert_eq!(lease.lock_until, at(10, 4, 0));
    assert_eq!(lease.locked_by, "node-a");

    let released = node(&repository, "node-a", at(10, 0, 30))
        .release(&name, at(10, 0, 0), TimeDelta::minutes(2))
        .await;
    assert_eq!(released.ok(), Some(at(10, 2, 0)));

    let too_soon = node(&repository, "node-b", at(10, 1, 0))
        .try_acquire(&name, at(10, 1, 0), TimeDelta::minutes(4))
        .await;
    assert!(matches!(too_soon, Ok(false)));

    let after_minimum = node(&repository, "node-b", at(10, 2, 30))
        .try_acquire(&name, at(10, 2, 30), TimeDelta::minutes(4))
        .await;
    assert!(matches!(after_minimum, Ok(true)));

    let lease = repository.find_lease(&name).await.unwrap_or_default();
    assert_eq!(lease.map(|lease| lease.locked_by), Some("node-b".to_owned()));
}

#[tokio::test]
async fn concurrent_first_acquisitions_elect_exactly_one_holder() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = Arc::new(PostgresLeaseRepository::new(pool));
    let name = unique_lock_name("job-race");
    let node_a = node(&repository, "node-a", at(10, 0, 0));
    let node_b = node(&repository, "node-b", at(10, 0, 0));

    let (first, second) = tokio::join!(
        node_a.try_acquire(&name, at(10, 0, 0), TimeDelta::minutes(4)),
        node_b.try_acquire(&name, at(10, 0, 0), TimeDelta::minutes(4)),
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    let winners = [first, second]
        .into_iter()
        .filter(|result| matches!(result, Ok(true)))
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn database_time_source_blocks_second_holder() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = Arc::new(PostgresLeaseRepository::with_options(
        pool,
        LeaseTableName::default(),
        LeaseTimeSource::Database,
    ));
    let name = unique_lock_name("job-db-time");
    let now = Utc::now();

    let first = node(&repository, "node-a", now)
        .try_acquire(&name, now, TimeDelta::minutes(4))
        .await;
    assert!(matches!(first, Ok(true)));

    let second = node(&repository, "node-b", now)
        .try_acquire(&name, now, TimeDelta::minutes(4))
        .await;
    assert!(matches!(second, Ok(false)));

    let released = node(&repository, "node-a", now)
        .release(&name, now, TimeDelta::minutes(1))
        .await;
    assert!(released.is_ok());

    let lease = repository.find_lease(&name).await.unwrap_or_default();
    let lease = lease.unwrap_or_else(|| panic!("lease row missing"));
    assert_eq!(lease.locked_by, "node-a");
    assert!(lease.lock_until >= lease.locked_at + TimeDelta::minutes(1));
    assert!(lease.lock_until < lease.locked_at + TimeDelta::minutes(4));
}

#[tokio::test]
async fn releasing_unknown_lease_is_a_no_op() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = Arc::new(PostgresLeaseRepository::new(pool));
    let name = unique_lock_name("job-missing");

    let released = node(&repository, "node-a", at(10, 0, 0))
        .release(&name, at(10, 0, 0), TimeDelta::minutes(2))
        .await;
    assert!(released.is_ok());

    let lease = repository.find_lease(&name).await;
    assert!(matches!(lease, Ok(None)));
}
