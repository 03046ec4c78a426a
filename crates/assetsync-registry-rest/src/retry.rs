//! Retry policy for registry calls.
//!
//! The registry sheds load with 429 and its gateway answers 502-504 while an
//! instance restarts. Both are retried, as are transport failures, with a
//! doubling delay. A 429 carrying `Retry-After` waits as long as it asks.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TRANSIENT_STATUSES: [StatusCode; 4] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// `registry.retry` section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    #[must_use]
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Whether a failed `attempt` (1-based) may be followed by another.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    #[must_use]
    pub fn is_transient(status: StatusCode) -> bool {
        TRANSIENT_STATUSES.contains(&status)
    }

    /// Delay after failed attempt `attempt` (1-based): the initial backoff
    /// doubled per earlier retry, capped at the maximum.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(63);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Delay after a transient `status`. A usable `Retry-After` on a 429
    /// replaces the computed backoff.
    #[must_use]
    pub fn wait_for(&self, attempt: u32, status: StatusCode, retry_after: Option<&str>) -> Duration {
        let requested = retry_after
            .filter(|_| status == StatusCode::TOO_MANY_REQUESTS)
            .and_then(parse_retry_after);
        requested.unwrap_or_else(|| self.backoff(attempt))
    }
}

/// `Retry-After` in delta-seconds form. HTTP dates are not honoured.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
