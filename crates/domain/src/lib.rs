//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod duration;
mod lease;

pub use duration::{format_iso8601_duration, parse_iso8601_duration};
pub use lease::{
    LOCK_NAME_MAX_LENGTH, LOCKED_BY_MAX_LENGTH, Lease, LockConfiguration, LockName, lock_until,
    unlock_time,
};
