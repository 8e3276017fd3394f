//! Opt-in exponential backoff for key set fetches.

use std::time::{Duration, SystemTime};

use reqwest_retry::{RetryDecision, RetryPolicy};

/// Doubling backoff, capped, for the few transient failures worth retrying
/// while a caller is waiting on a token validation.
pub struct KeyFetchBackoff {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl KeyFetchBackoff {
    /// Create a backoff policy allowing `max_retries` retries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }

    fn delay_for(&self, n_past_retries: u32) -> Duration {
        let factor = 1u32.checked_shl(n_past_retries).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl RetryPolicy for KeyFetchBackoff {
    fn should_retry(&self, _request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if n_past_retries >= self.max_retries {
            RetryDecision::DoNotRetry
        } else {
            RetryDecision::Retry {
                execute_after: SystemTime::now() + self.delay_for(n_past_retries),
            }
        }
    }
}
