use std::time::Duration;

/// Bounded polling used when waiting for on-chain finality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Status queries before giving up with a confirmation timeout.
    pub max_attempts: u32,
    /// Sleep between two status queries.
    pub interval: Duration,
    /// Period of the background confirmation watcher.
    pub watch_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
            watch_interval: Duration::from_secs(15),
        }
    }
}
