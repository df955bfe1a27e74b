//! Exponential backoff with a ceiling.
//!
//! `attempt` is the number of attempts already made. The policy is a pure
//! function of it, so the same input always yields the same decision.

use std::time::Duration;

use crate::config::RequestConfig;

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether another attempt should be made.
    pub should_retry: bool,
    /// How long to wait before it.
    pub delay: Duration,
}

/// Retry policy for backend connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Build a policy from request configuration.
    pub fn from_config(config: &RequestConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_millis(config.max_retry_delay_ms),
        )
    }

    /// Decide whether to retry after `attempt` attempts have been made.
    pub fn next(&self, attempt: u32) -> RetryDecision {
        RetryDecision {
            should_retry: attempt < self.max_attempts,
            delay: self.delay_for(attempt),
        }
    }

    /// Decision after `failed` attempts in a row have failed.
    ///
    /// The first wait is `base`, so this is `next` with the delay taken for
    /// the zero-based index of the attempt that just failed.
    pub fn after_failures(&self, failed: u32) -> RetryDecision {
        RetryDecision {
            should_retry: failed < self.max_attempts,
            delay: self.delay_for(failed.saturating_sub(1)),
        }
    }

    /// `min(base * 2^attempt, max_delay)`, saturating.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Total attempts permitted.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RequestConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(30))
    }

    #[test]
    fn test_retries_until_max_attempts() {
        let p = policy();
        assert!(p.next(0).should_retry);
        assert!(p.next(1).should_retry);
        assert!(p.next(2).should_retry);
        assert!(!p.next(3).should_retry);
    }

    #[test]
    fn test_never_retries_past_max() {
        let p = policy();
        for attempt in 3..200 {
            assert!(!p.next(attempt).should_retry, "attempt {}", attempt);
        }
    }

    #[test]
    fn test_exponential_delays() {
        let p = policy();
        assert_eq!(p.next(0).delay, Duration::from_millis(100));
        assert_eq!(p.next(1).delay, Duration::from_millis(200));
        assert_eq!(p.next(2).delay, Duration::from_millis(400));
        assert_eq!(p.next(3).delay, Duration::from_millis(800));
    }

    #[test]
    fn test_delay_monotonic_and_capped() {
        let p = RetryPolicy::new(100, Duration::from_millis(250), Duration::from_secs(30));
        let mut previous = Duration::ZERO;
        for attempt in 0..100 {
            let delay = p.next(attempt).delay;
            assert!(delay >= previous, "attempt {} went backwards", attempt);
            assert!(delay <= Duration::from_secs(30));
            previous = delay;
        }
        assert_eq!(p.next(99).delay, Duration::from_secs(30));
    }

    #[test]
    fn test_after_failures_starts_at_base() {
        let p = policy();
        let delays: Vec<Duration> = (1..=3).map(|n| p.after_failures(n).delay).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
        assert!(p.after_failures(2).should_retry);
        assert!(!p.after_failures(3).should_retry);
    }

    #[test]
    fn test_deterministic() {
        let p = policy();
        assert_eq!(p.next(2), p.next(2));
    }

    #[test]
    fn test_zero_max_attempts_clamped() {
        let p = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(p.max_attempts(), 1);
        assert!(p.next(0).should_retry);
        assert!(!p.next(1).should_retry);
    }

    #[test]
    fn test_from_config() {
        let config = RequestConfig {
            max_retries: 5,
            retry_delay_ms: 10,
            max_retry_delay_ms: 50,
            ..RequestConfig::default()
        };
        let p = RetryPolicy::from_config(&config);
        assert_eq!(p.max_attempts(), 5);
        assert_eq!(p.next(10).delay, Duration::from_millis(50));
    }
}
