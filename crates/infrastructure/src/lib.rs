//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod host_identity;
mod in_memory_lease_repository;
mod postgres_lease_repository;
mod system_clock;

pub use host_identity::{UNKNOWN_HOST_IDENTITY, resolve_host_identity};
pub use in_memory_lease_repository::InMemoryLeaseRepository;
pub use postgres_lease_repository::{LeaseTableName, LeaseTimeSource, PostgresLeaseRepository};
pub use system_clock::SystemClock;
