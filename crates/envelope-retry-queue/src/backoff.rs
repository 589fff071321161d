//! Retry backoff policy.

use std::time::Duration;

/// Backoff and abandonment settings.
///
/// Retry delay is `min_delay * 2^(attempts - 1)` capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Failed attempts after which an entry is abandoned.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Whether an entry with `attempts` failures should be dropped.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts.max(1)
    }
}

/// Delay before the next attempt of an entry that has failed `attempts` times.
pub fn compute_backoff(attempts: u32, policy: &RetryPolicy) -> chrono::Duration {
    if attempts == 0 {
        return chrono::Duration::zero();
    }

    let base_ms = policy.min_delay.as_millis() as u64;
    let max_ms = policy.max_delay.as_millis() as u64;
    let shift = attempts.saturating_sub(1);
    let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    chrono::Duration::milliseconds(delay_ms as i64)
}
