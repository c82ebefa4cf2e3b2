use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use crate::domain::errors::{LlmError, LlmResult};
use crate::domain::models::RetryConfig;

/// Decides whether a failed attempt may be retried.
///
/// - Transport-level failures (connection refused, reset, timeout) are always retryable
/// - API errors are retryable iff their status is in the configured set
/// - Everything else (decode errors, cancellation, other 4xx) is terminal
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    retryable_statuses: HashSet<u16>,
}

impl ErrorClassifier {
    pub fn new(retryable_statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            retryable_statuses: retryable_statuses.into_iter().collect(),
        }
    }

    pub fn is_retryable(&self, error: &LlmError) -> bool {
        match error {
            LlmError::Transport(_) | LlmError::Timeout => true,
            LlmError::Api { status, .. } => self.retryable_statuses.contains(status),
            _ => false,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new([429, 500, 502, 503, 504])
    }
}

/// Retry policy with bounded exponential backoff
///
/// Backoff doubles after each failed attempt: 1s → 2s → 4s → … → `max_delay`.
/// Attempt 1 is sent without delay; after failed attempt `n` the policy
/// sleeps `backoff_delay(n)` before attempt `n + 1`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    classifier: ErrorClassifier,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Example
    /// ```
    /// use llmlink::infrastructure::llm::retry::{ErrorClassifier, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(
    ///     3,
    ///     Duration::from_secs(1),
    ///     Duration::from_secs(10),
    ///     ErrorClassifier::default(),
    /// );
    /// assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    /// ```
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        classifier: ErrorClassifier,
    ) -> Self {
        assert!(max_attempts > 0, "max_attempts must be greater than 0");
        assert!(max_delay >= initial_delay, "max_delay must be >= initial_delay");

        Self {
            max_attempts,
            initial_delay,
            max_delay,
            classifier,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            ErrorClassifier::new(config.retryable_statuses.iter().copied()),
        )
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff for a 1-indexed attempt: `min(initial * 2^(attempt-1), max)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1_u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Run `operation` under the attempt loop.
    ///
    /// Each attempt first waits on `limiter`, then runs the operation raced
    /// against `cancel`. Retryable failures sleep for the backoff (also raced
    /// against `cancel`) and try again until `max_attempts` is reached.
    ///
    /// # Returns
    /// * `Ok(T)` - an attempt succeeded
    /// * `Err(LlmError::Cancelled)` - cancelled while waiting, sending or sleeping
    /// * `Err(LlmError::RetriesExhausted)` - every attempt failed with a retryable error
    /// * `Err(e)` - the first non-retryable error, unwrapped
    pub async fn execute<F, Fut, T>(
        &self,
        limiter: &RateLimiter,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> LlmResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = LlmResult<T>>,
    {
        let mut attempt = 1;

        loop {
            limiter.wait(cancel).await?;

            let result = tokio::select! {
                () = cancel.cancelled() => return Err(LlmError::Cancelled),
                result = operation(attempt) => result,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if matches!(err, LlmError::Cancelled) {
                return Err(err);
            }

            if !self.classifier.is_retryable(&err) {
                debug!(attempt, error = %err, "permanent error, not retrying");
                return Err(err);
            }

            if attempt >= self.max_attempts {
                warn!(attempts = attempt, error = %err, "retries exhausted");
                return Err(LlmError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let backoff = self.backoff_delay(attempt);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "transient error, retrying"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(LlmError::Cancelled),
                () = sleep(backoff) => {}
            }

            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s initial backoff, 10s ceiling, default retryable statuses
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
