//! Bounded exponential backoff shared by the embedder and the dispatcher.

use std::time::Duration;

/// Retry policy for transient provider failures.
///
/// Attempts are bounded: `max_attempts` counts the initial try plus retries,
/// so `max_attempts = 3` means at most two retries before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the given retry (1-based), exponential with jitter,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
            .min(self.max_delay);
        // Up to 25% jitter to avoid thundering herds on shared quotas.
        let jitter_ms = exp.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return exp;
        }
        exp + Duration::from_millis(rand::random_range(0..jitter_ms))
    }
}
