use crate::shared::config::SyncConfig;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Retry ceiling plus capped exponential backoff between attempts of one queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.backoff_base(),
            max_delay: config.backoff_max(),
            jitter: config.backoff_jitter,
        }
    }

    /// Entries become eligible again on the very next pass.
    pub fn without_backoff(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Delay after the `retry_count`-th failure: `base * 2^(n-1)` capped at `max_delay`.
    /// With jitter the result is drawn uniformly from the upper half of that window.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        if self.base_delay.is_zero() || retry_count == 0 {
            return Duration::ZERO;
        }

        let exponent = retry_count.saturating_sub(1).min(20);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let floor = delay / 2;
        let spread = (delay - floor).as_millis() as u64;
        floor + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    /// Saturates at the latest representable instant instead of overflowing.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay_for(retry_count))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
