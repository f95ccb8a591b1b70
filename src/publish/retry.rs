// src/publish/retry.rs
use std::time::Duration;

use rand::Rng;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Exponential backoff for transient publish failures.
///
/// `max_attempts` counts every try, the first one included. The delay before
/// try `n + 1` is `base * 2^(n - 1)` plus up to `jitter` of uniform noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }

    /// Deterministic part of the delay after `tries_done` failed tries.
    pub fn backoff(&self, tries_done: u32) -> Duration {
        let exp = tries_done.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    pub fn delay_before_retry(&self, tries_done: u32) -> Duration {
        let base = self.backoff(tries_done);
        if self.jitter.is_zero() {
            return base;
        }
        let max_ms = self.jitter.as_millis().min(u128::from(u64::MAX)) as u64;
        base.saturating_add(Duration::from_millis(rand::rng().random_range(0..=max_ms)))
    }
}
