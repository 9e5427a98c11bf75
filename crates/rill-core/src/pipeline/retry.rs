//! Truncated exponential backoff for transient segment failures

use rand::Rng;
use std::time::Duration;

/// Retry budget and backoff shape for one pipeline
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first; 0 disables retry
    pub max_retry: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Uniform jitter added on top of the truncated delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(3000),
            max_jitter: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn with_budget(max_retry: u32) -> Self {
        Self { max_retry, ..Self::default() }
    }

    /// No retries; used for optional image tracks
    pub fn none() -> Self {
        Self::with_budget(0)
    }

    /// Delay before retry number `attempt` (0-based):
    /// `min(base * 2^attempt, max) + jitter in [0, max_jitter)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let truncated = exponential.min(self.max_delay);
        let jitter_bound = (self.max_jitter.as_millis() as u64).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_bound);
        truncated + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_with_jitter_bound() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d0 = policy.backoff(0).as_millis();
            let d1 = policy.backoff(1).as_millis();
            let d2 = policy.backoff(2).as_millis();
            assert!((200..400).contains(&d0), "d0 = {d0}");
            assert!((400..800).contains(&d1), "d1 = {d1}");
            assert!((800..1600).contains(&d2), "d2 = {d2}");
        }
    }

    #[test]
    fn test_backoff_truncates_at_max_delay() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.backoff(10).as_millis();
            assert!((3000..3200).contains(&d), "d = {d}");
        }
    }
}
