//! Retry configuration for exchange HTTP requests.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Retry settings for failed operations.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    #[serde(default, with = "duration")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(default, with = "duration")]
    pub max_delay: Duration,
    /// Factor by which delay increases after each retry.
    pub multiplier: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: Some(DEFAULT_MULTIPLIER),
        }
    }
}

impl RetryConfig {
    /// Total attempts allowed, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = if self.initial_delay.is_zero() {
            DEFAULT_INITIAL_DELAY
        } else {
            self.initial_delay
        };
        let max = if self.max_delay.is_zero() {
            DEFAULT_MAX_DELAY
        } else {
            self.max_delay
        };
        let multiplier = self.multiplier.filter(|m| *m >= 1.0).unwrap_or(DEFAULT_MULTIPLIER);

        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let delay = initial.as_secs_f64() * multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(max.as_secs_f64()))
    }
}
