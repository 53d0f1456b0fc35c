//! Retry with exponential backoff, and classification of raw provider errors.
//!
//! Retried:
//! - Timeouts and connection failures
//! - 5xx server errors
//! - Malformed response bodies
//!
//! Never retried:
//! - 4xx client errors, including 401/403 and 429
//! - Cancellation

use std::future::Future;
use std::time::Duration;

use nimbus_core::RetrySettings;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, ProviderError};

/// Longest provider error body carried into a message
const MAX_MESSAGE_LEN: usize = 200;

/// Backoff schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry (doubles each attempt)
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.max_retries, settings.base_delay_ms, settings.max_delay_ms)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// `min(base * 2^attempt, max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// Translate a raw adapter error into the [`FetchError`] taxonomy.
pub fn classify(error: ProviderError) -> FetchError {
    match error {
        ProviderError::Status { status, body } if (400..500).contains(&status) => {
            FetchError::Client {
                status,
                message: error_message(status, &body),
            }
        }
        ProviderError::Status { status, body } => FetchError::Transient {
            status: Some(status),
            message: error_message(status, &body),
        },
        ProviderError::Transport { message, timeout } => FetchError::Transient {
            status: None,
            message: if timeout {
                format!("timed out: {}", message)
            } else {
                message
            },
        },
        ProviderError::Decode(message) => FetchError::DataShape(message),
        // Status 0: rejected locally before any request was made
        ProviderError::NotConfigured(message) => FetchError::Client { status: 0, message },
    }
}

/// Pull a human-readable message out of an error body.
///
/// Both providers answer errors with JSON carrying a `message` or `reason`
/// field; anything else is used as-is, truncated.
fn error_message(status: u16, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "reason", "error"]
                .iter()
                .find_map(|field| v.get(*field)?.as_str().map(str::to_string))
        });

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => body.trim().chars().take(MAX_MESSAGE_LEN).collect(),
    }
}

/// Run `operation` under `policy`, retrying retryable failures.
///
/// Cancellation is observed both during an attempt and while waiting out a
/// backoff delay; either way the result is [`FetchError::Cancelled`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation_name: &str,
    operation: F,
) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay_for_attempt(attempt - 1);
            tracing::info!(
                "{}: retry attempt {} of {}, waiting {:?}",
                operation_name,
                attempt,
                policy.max_retries,
                delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = operation() => result,
        };

        let error = match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("{}: succeeded after {} retries", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) => classify(e),
        };

        if !error.is_retryable() {
            tracing::debug!("{}: non-retryable error: {}", operation_name, error);
            return Err(error);
        }

        if attempt >= policy.max_retries {
            tracing::error!(
                "{}: all {} attempts exhausted: {}",
                operation_name,
                policy.max_retries + 1,
                error
            );
            return Err(error);
        }

        tracing::warn!(
            "{}: retryable error on attempt {} of {}: {}",
            operation_name,
            attempt + 1,
            policy.max_retries + 1,
            error
        );
        attempt += 1;
    }
}
