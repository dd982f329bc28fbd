//! Application services and ports.

#![forbid(unsafe_code)]

mod lease_lock_service;
mod lease_ports;
mod scheduled_job_runner;

#[cfg(test)]
mod test_support;

pub use lease_lock_service::{ExecutionOutcome, LeaseLockService};
pub use lease_ports::{AcquireLeaseInput, Clock, LeaseRepository, ReleaseLeaseInput};
pub use scheduled_job_runner::{ScheduledJob, ScheduledJobRunner, ScheduledTask};
