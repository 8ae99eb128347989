//! Retry policy: bounded exponential backoff with jitter

use std::time::Duration;

/// Status codes worth retrying: request timeout, throttling, and the
/// transient server-side 5xx family.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-indexed):
    /// `min(base * 2^attempt, max)` scaled by a 0.5-1.0 jitter factor.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let raw = (base_ms * 2.0_f64.powi(attempt.min(16) as i32)).min(max_ms);
        Duration::from_millis((raw * jitter_factor()) as u64)
    }
}

/// Jitter factor in [0.5, 1.0), derived from the std hasher's random seed.
/// Only needs to break synchronization across clients, not be
/// cryptographic, so no rand dependency.
fn jitter_factor() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hash = RandomState::new().build_hasher().finish();
    0.5 + (hash % 500) as f64 / 1000.0
}
