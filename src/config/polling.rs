//! Poll interval configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Default time between two evaluations of a position.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polling settings shared by all positions.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Time between two price samples (default: 10s).
    #[serde(default, with = "duration")]
    pub interval: Duration,
}

impl PollingConfig {
    /// Returns the configured interval, or the default when unset.
    pub fn interval(&self) -> Duration {
        if self.interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            self.interval
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
