// src/exec/retry.rs

use std::time::Duration;

use crate::errors::TaskError;
use crate::types::Backoff;

/// Per-task retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
    /// Upper bound on any single wait.
    pub max_delay: Option<Duration>,
    /// Also retry `QualityCheckFailed`, which is terminal otherwise.
    pub retry_quality_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            max_delay: None,
            retry_quality_failures: false,
        }
    }

    pub fn fixed(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            ..Self::none()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let n = retry.max(1);
        let delay = match self.backoff {
            Backoff::Fixed => self.retry_delay,
            Backoff::Linear => self.retry_delay.saturating_mul(n),
            Backoff::Exponential => {
                let factor = 2u32.checked_pow(n - 1).unwrap_or(u32::MAX);
                self.retry_delay.saturating_mul(factor)
            }
        };

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Whether a failure of attempt number `attempt` (1-based) should be
    /// followed by another attempt.
    pub fn should_retry(&self, error: &TaskError, attempt: u32) -> bool {
        if attempt > self.max_retries {
            return false;
        }
        match error {
            TaskError::Cancelled => false,
            TaskError::QualityCheckFailed(_) => self.retry_quality_failures,
            other => other.is_retryable(),
        }
    }
}
