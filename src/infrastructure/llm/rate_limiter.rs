use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::domain::errors::{LlmError, LlmResult};

/// Fixed-window rate limiter for outbound requests
///
/// Allows `budget` requests per `window`. The budget is refilled once when a
/// caller arrives after the current window has ended; callers that find the
/// budget empty sleep until the window end and try again.
///
/// # Algorithm
/// - On wait: if `now >= window_start + window`, refill and restart the window at `now`
/// - If a token is available, take it and return
/// - Otherwise release the lock and sleep until the window ends (or cancellation)
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<WindowState>,
    budget: u32,
    window: Duration,
}

#[derive(Debug)]
struct WindowState {
    available: u32,
    window_start: Instant,
    /// Diagnostic counter of granted requests; never consulted for scheduling
    total_requests: u64,
}

impl RateLimiter {
    /// Create a limiter allowing `budget` requests per `window`.
    ///
    /// # Example
    /// ```
    /// use llmlink::infrastructure::llm::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // 50 requests per minute
    /// let limiter = RateLimiter::new(50, Duration::from_secs(60));
    /// ```
    pub fn new(budget: u32, window: Duration) -> Self {
        assert!(budget > 0, "budget must be positive");
        assert!(!window.is_zero(), "window must be non-zero");

        Self {
            state: Mutex::new(WindowState {
                available: budget,
                window_start: Instant::now(),
                total_requests: 0,
            }),
            budget,
            window,
        }
    }

    /// Wait for a request slot.
    ///
    /// Returns `LlmError::Cancelled` as soon as `cancel` fires, including when
    /// it is already cancelled on entry, in which case no state is touched.
    pub async fn wait(&self, cancel: &CancellationToken) -> LlmResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            let window_end = {
                let mut state = tokio::select! {
                    () = cancel.cancelled() => return Err(LlmError::Cancelled),
                    state = self.state.lock() => state,
                };

                let now = Instant::now();
                if now.duration_since(state.window_start) >= self.window {
                    trace!(budget = self.budget, "rate limit window rolled over");
                    state.available = self.budget;
                    state.window_start = now;
                }

                if state.available > 0 {
                    state.available -= 1;
                    state.total_requests += 1;
                    return Ok(());
                }

                state.window_start + self.window
            };

            debug!(
                wait_ms = window_end
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
                "rate limit budget exhausted, waiting for next window"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(LlmError::Cancelled),
                () = sleep_until(window_end) => {}
            }
        }
    }

    /// Number of requests granted so far (diagnostics only).
    pub async fn total_requests(&self) -> u64 {
        self.state.lock().await.total_requests
    }
}
