use chrono::{DateTime, Utc};
use leasehold_application::Clock;

/// Clock adapter reading the node's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
