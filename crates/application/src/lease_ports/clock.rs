use chrono::{DateTime, Utc};

/// Wall-clock source used to stamp lease acquisitions and releases.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}
