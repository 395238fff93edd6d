//! Retry policy with exponential backoff.
//!
//! Retryable step failures are retried inside the executor with
//! `base_delay · 2^(attempt-1)` delays, capped at `max_delay`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry behaviour for retryable step failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential growth.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the failure of the given 1-based attempt, before
    /// attempt `attempt + 1` runs: `base_delay · 2^(attempt-1)`, capped at
    /// `max_delay`.
    #[must_use]
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let factor = 1u64 << shift;
        let delay = self.base_delay.saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failed.
    #[must_use]
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
