//! Retry policy for tunnel attempts.

use serde::{Deserialize, Serialize};
use std::cmp;
use std::time::Duration;

/// Bounded exponential backoff between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per `connect`, including the first; 1 means no automatic retry
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt; the user retries by hand.
    pub fn manual() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }

    /// Up to `max_attempts` attempts with doubling delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::manual()
        }
    }

    /// Delay to wait after the `failed_attempt`-th failure (1-based).
    pub fn backoff_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        cmp::min(delay, self.max_backoff)
    }

    pub fn allows_another(&self, failed_attempt: u32) -> bool {
        failed_attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::manual()
    }
}
