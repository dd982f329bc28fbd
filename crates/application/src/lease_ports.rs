mod clock;
mod inputs;
mod repository;

pub use clock::Clock;
pub use inputs::{AcquireLeaseInput, ReleaseLeaseInput};
pub use repository::LeaseRepository;
