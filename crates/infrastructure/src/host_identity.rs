//! Node identity recorded in `locked_by`.

use tracing::warn;

/// Identity used when the hostname cannot be resolved.
pub const UNKNOWN_HOST_IDENTITY: &str = "unknown";

/// Resolves a stable identifier for this node from the OS hostname.
#[must_use]
pub fn resolve_host_identity() -> String {
    match hostname::get() {
        Ok(value) => {
            let value = value.to_string_lossy().trim().to_owned();
            if value.is_empty() {
                UNKNOWN_HOST_IDENTITY.to_owned()
            } else {
                value
            }
        }
        Err(error) => {
            warn!(error = %error, "failed to resolve hostname for lease holder identity");
            UNKNOWN_HOST_IDENTITY.to_owned()
        }
    }
}
