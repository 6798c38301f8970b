//! Retry policy for transient network failures.
//!
//! Implements exponential backoff with configurable parameters.

use std::time::Duration;

use crate::config::RetrySettings;

/// Implemented by error types that can distinguish transient failures
/// (worth retrying) from permanent ones.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries before permanent failure.
    pub max_retries: u32,
    /// Initial backoff duration in seconds.
    pub initial_backoff_secs: u64,
    /// Maximum backoff duration in seconds (cap for exponential growth).
    pub max_backoff_secs: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &RetrySettings) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_secs: config.initial_backoff_secs,
            max_backoff_secs: config.max_backoff_secs,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Check if an error should be retried given the current retry count.
    pub fn should_retry<E: Retryable>(&self, error: &E, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Calculate backoff duration in seconds for a given retry count.
    ///
    /// Uses exponential backoff: `initial_backoff * multiplier^retry_count`,
    /// capped at `max_backoff_secs`.
    pub fn backoff_secs(&self, retry_count: u32) -> u64 {
        let backoff =
            self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(retry_count as i32);
        (backoff.min(self.max_backoff_secs as f64)) as u64
    }

    /// Same as [`backoff_secs`](Self::backoff_secs) but as a [`Duration`],
    /// ready to hand to `tokio::time::sleep`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        Duration::from_secs(self.backoff_secs(retry_count))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_secs: 2,
            max_backoff_secs: 30,
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum FakeError {
        Transient,
        Permanent,
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, FakeError::Transient)
        }
    }

    #[test]
    fn test_new_from_config() {
        let settings = RetrySettings {
            max_retries: 5,
            initial_backoff_secs: 10,
            max_backoff_secs: 120,
            backoff_multiplier: 3.0,
        };
        let policy = RetryPolicy::new(&settings);

        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff_secs, 10);
        assert_eq!(policy.max_backoff_secs, 120);
        assert_eq!(policy.backoff_multiplier, 3.0);
    }

    #[test]
    fn test_default() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_backoff_secs, 2);
        assert_eq!(policy.max_backoff_secs, 30);
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_secs: 2,
            max_backoff_secs: 3600,
            backoff_multiplier: 2.0,
        };

        // retry_count=0: 2 * 2^0 = 2
        assert_eq!(policy.backoff_secs(0), 2);

        // retry_count=1: 2 * 2^1 = 4
        assert_eq!(policy.backoff_secs(1), 4);

        // retry_count=2: 2 * 2^2 = 8
        assert_eq!(policy.backoff_secs(2), 8);

        // retry_count=3: 2 * 2^3 = 16
        assert_eq!(policy.backoff_secs(3), 16);
    }

    #[test]
    fn test_backoff_capping() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff_secs: 2,
            max_backoff_secs: 30,
            backoff_multiplier: 2.0,
        };

        // retry_count=3: 2 * 2^3 = 16 (under cap)
        assert_eq!(policy.backoff_secs(3), 16);

        // retry_count=4: 2 * 2^4 = 32 -> capped at 30
        assert_eq!(policy.backoff_secs(4), 30);

        // retry_count=8: 2 * 2^8 = 512 -> capped at 30
        assert_eq!(policy.backoff_secs(8), 30);
    }

    #[test]
    fn test_backoff_duration() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(1), Duration::from_secs(4));
    }

    #[test]
    fn test_should_retry_transient_under_limit() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(&FakeError::Transient, 0));
        assert!(policy.should_retry(&FakeError::Transient, 1));
        assert!(policy.should_retry(&FakeError::Transient, 2));

        // At or above max_retries: give up.
        assert!(!policy.should_retry(&FakeError::Transient, 3));
        assert!(!policy.should_retry(&FakeError::Transient, 10));
    }

    #[test]
    fn test_should_retry_permanent_never_retries() {
        let policy = RetryPolicy::default();

        assert!(!policy.should_retry(&FakeError::Permanent, 0));
        assert!(!policy.should_retry(&FakeError::Permanent, 1));
    }

    #[test]
    fn test_multiplier_of_one() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_secs: 7,
            max_backoff_secs: 1000,
            backoff_multiplier: 1.0,
        };

        // 7 * 1^n = 7 for all n
        assert_eq!(policy.backoff_secs(0), 7);
        assert_eq!(policy.backoff_secs(5), 7);
        assert_eq!(policy.backoff_secs(10), 7);
    }
}
