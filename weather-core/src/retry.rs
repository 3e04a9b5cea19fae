//! Retry with exponential backoff for upstream calls.
//!
//! Retried: timeouts, connection failures, 5xx, 408 and 429.
//! Everything else (other 4xx, request building errors) is returned at once.

use std::future::Future;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 0.2;
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Seconds; the n-th retry waits `backoff_factor * 2^n`.
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max = Duration::from_millis(self.max_delay_ms);
        let secs = (self.backoff_factor * 2f64.powi(attempt.min(62) as i32)).max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(max).min(max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

pub fn is_retryable_error(error: &reqwest::Error) -> RetryDecision {
    if error.is_timeout() || error.is_connect() {
        return RetryDecision::Retry;
    }
    match error.status() {
        Some(status) => is_retryable_status(status),
        None => RetryDecision::NoRetry,
    }
}

pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RetryDecision::Retry
    } else {
        RetryDecision::NoRetry
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
/// The last response (even a retryable error status) or error is returned.
pub async fn with_retry<F, Fut>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let result = operation().await;

        let decision = match &result {
            Ok(response) => is_retryable_status(response.status()),
            Err(err) => is_retryable_error(err),
        };
        if decision == RetryDecision::NoRetry || attempt >= policy.max_retries {
            if attempt > 0 && result.as_ref().is_ok_and(|r| r.status().is_success()) {
                tracing::info!("Upstream request succeeded after {} retries", attempt);
            }
            return result;
        }

        let delay = policy.delay_for_attempt(attempt);
        match &result {
            Ok(response) => tracing::warn!(
                "Upstream returned {}, retry {} of {} in {:?}",
                response.status(),
                attempt + 1,
                policy.max_retries,
                delay
            ),
            Err(err) => tracing::warn!(
                "Upstream request failed ({}), retry {} of {} in {:?}",
                err,
                attempt + 1,
                policy.max_retries,
                delay
            ),
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
