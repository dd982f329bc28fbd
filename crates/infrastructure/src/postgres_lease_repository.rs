//! PostgreSQL-backed lease table adapter.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use tracing::debug;

use leasehold_application::{AcquireLeaseInput, LeaseRepository, ReleaseLeaseInput};
use leasehold_core::{AppError, AppResult};
use leasehold_domain::{Lease, LockName};

mod table_name;

#[cfg(test)]
mod tests;

pub use table_name::LeaseTableName;

/// Which clock lease timestamps are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeaseTimeSource {
    /// Bind the instants computed by the calling node.
    #[default]
    Client,
    /// Evaluate `now()` on the database server so skewed node clocks agree.
    /// Releases measure the minimum hold from the stored `locked_at`.
    Database,
}

#[derive(Debug, Clone)]
struct LeaseStatements {
    update_if_expired: String,
    insert_if_absent: String,
    set_lock_until: String,
    find_lease: String,
}

impl LeaseStatements {
    fn new(table: &LeaseTableName, time_source: LeaseTimeSource) -> Self {
        let table = table.as_str();
        let find_lease = format!(
            "SELECT name, lock_until, locked_at, locked_by FROM {table} WHERE name = $1"
        );

        match time_source {
            LeaseTimeSource::Client => Self {
                update_if_expired: format!(
                    "UPDATE {table} SET lock_until = $1, locked_at = $2, locked_by = $3 \
                     WHERE name = $4 AND lock_until <= $2"
                ),
                insert_if_absent: format!(
                    "INSERT INTO {table} (name, lock_until, locked_at, locked_by) \
                     VALUES ($1, $2, $3, $4) ON CONFLICT (name) DO NOTHING"
                ),
                set_lock_until: format!("UPDATE {table} SET lock_until = $1 WHERE name = $2"),
                find_lease,
            },
            LeaseTimeSource::Database => Self {
                update_if_expired: format!(
                    "UPDATE {table} \
                     SET lock_until = now() + make_interval(secs => $1::float8), \
                         locked_at = now(), locked_by = $2 \
                     WHERE name = $3 AND lock_until <= now()"
                ),
                insert_if_absent: format!(
                    "INSERT INTO {table} (name, lock_until, locked_at, locked_by) \
                     VALUES ($1, now() + make_interval(secs => $2::float8), now(), $3) \
                     ON CONFLICT (name) DO NOTHING"
                ),
                set_lock_until: format!(
                    "UPDATE {table} \
                     SET lock_until = GREATEST(locked_at + make_interval(secs => $1::float8), now()) \
                     WHERE name = $2"
                ),
                find_lease,
            },
        }
    }
}

/// PostgreSQL implementation of the lease repository port.
#[derive(Clone)]
pub struct PostgresLeaseRepository {
    pool: PgPool,
    time_source: LeaseTimeSource,
    statements: LeaseStatements,
}

impl PostgresLeaseRepository {
    /// Creates a repository using the default `shedlock` table and client time.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_options(pool, LeaseTableName::default(), LeaseTimeSource::Client)
    }

    /// Creates a repository for a specific table and time source.
    #[must_use]
    pub fn with_options(
        pool: PgPool,
        table: LeaseTableName,
        time_source: LeaseTimeSource,
    ) -> Self {
        let statements = LeaseStatements::new(&table, time_source);

        Self {
            pool,
            time_source,
            statements,
        }
    }
}

#[async_trait]
impl LeaseRepository for PostgresLeaseRepository {
    async fn update_if_expired(&self, input: &AcquireLeaseInput) -> AppResult<bool> {
        let query = sqlx::query(self.statements.update_if_expired.as_str());
        let query = match self.time_source {
            LeaseTimeSource::Client => query
                .bind(input.lock_until)
                .bind(input.now)
                .bind(input.locked_by.as_str())
                .bind(input.name.as_str()),
            LeaseTimeSource::Database => query
                .bind(interval_seconds(input.lock_at_most_for))
                .bind(input.locked_by.as_str())
                .bind(input.name.as_str()),
        };

        let result = query.execute(&self.pool).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to acquire lease '{}': {error}",
                input.name
            ))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_if_absent(&self, input: &AcquireLeaseInput) -> AppResult<bool> {
        let query =
            sqlx::query(self.statements.insert_if_absent.as_str()).bind(input.name.as_str());
        let query = match self.time_source {
            LeaseTimeSource::Client => query
                .bind(input.lock_until)
                .bind(input.now)
                .bind(input.locked_by.as_str()),
            LeaseTimeSource::Database => query
                .bind(interval_seconds(input.lock_at_most_for))
                .bind(input.locked_by.as_str()),
        };

        let result = query.execute(&self.pool).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to create lease '{}': {error}",
                input.name
            ))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_lock_until(&self, input: &ReleaseLeaseInput) -> AppResult<()> {
        let query = sqlx::query(self.statements.set_lock_until.as_str());
        let query = match self.time_source {
            LeaseTimeSource::Client => query.bind(input.unlock_at),
            LeaseTimeSource::Database => query.bind(interval_seconds(input.lock_at_least_for)),
        };

        let result = query
            .bind(input.name.as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to release lease '{}': {error}",
                    input.name
                ))
            })?;

        if result.rows_affected() == 0 {
            debug!(lock_name = %input.name, "released lease has no row");
        }

        Ok(())
    }

    async fn find_lease(&self, name: &LockName) -> AppResult<Option<Lease>> {
        let row = sqlx::query_as::<_, LeaseRow>(self.statements.find_lease.as_str())
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load lease '{name}': {error}"))
            })?;

        row.map(LeaseRow::into_lease).transpose()
    }
}

fn interval_seconds(duration: TimeDelta) -> f64 {
    duration.num_milliseconds() as f64 / 1_000.0
}

#[derive(Debug, sqlx::FromRow)]
struct LeaseRow {
    name: String,
    lock_until: DateTime<Utc>,
    locked_at: DateTime<Utc>,
    locked_by: String,
}

impl LeaseRow {
    fn into_lease(self) -> AppResult<Lease> {
        Ok(Lease {
            name: LockName::new(self.name)?,
            lock_until: self.lock_until,
            locked_at: self.locked_at,
            locked_by: self.locked_by,
        })
    }
}
