//! Retry policy for transient registry failures.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};

/// Exponential backoff policy applied to every registry request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Wait before the first retry.
    pub min_wait: Duration,

    /// Upper bound for any single wait, including `Retry-After`.
    pub max_wait: Duration,

    /// Multiplier applied to the wait after each retry.
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_wait: Duration::from_millis(200),
            max_wait: Duration::from_secs(3),
            backoff: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            backoff: 1.0,
        }
    }

    /// Returns true if a response with this status should be retried.
    #[must_use]
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        )
    }

    /// Returns true if a transport error should be retried.
    #[must_use]
    pub fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout()
    }

    /// Returns the wait before retry number `attempt` (zero-based).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let millis = (self.min_wait.as_millis() as f64 * factor).min(u64::MAX as f64);
        Duration::from_millis(millis as u64).min(self.max_wait)
    }

    /// Returns the wait requested by the server's `Retry-After` header, in
    /// seconds, capped at `max_wait`.
    #[must_use]
    pub fn retry_after(&self, response: &Response) -> Option<Duration> {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(self.max_wait))
    }
}
