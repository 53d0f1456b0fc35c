//! Error types for the weather layer.
//!
//! Adapters report raw [`ProviderError`]s. The fetch orchestrator is the only
//! place they are classified into the [`FetchError`] taxonomy that callers
//! see. Storage problems never leave the snapshot store; they surface only as
//! the named [`StorageUnavailable`] outcome.

use nimbus_core::{AppError, WeatherError};
use thiserror::Error;

/// Raw failure from a provider adapter
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-2xx HTTP response; the status is preserved
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection failure, reset or timeout
    #[error("Transport error: {message}")]
    Transport { message: String, timeout: bool },

    /// The body did not match the provider's documented shape
    #[error("Unexpected response shape: {0}")]
    Decode(String),

    /// The adapter is missing required settings (e.g. an API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ProviderError::Transport {
                timeout: e.is_timeout(),
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Decode(e.to_string())
    }
}

/// Classified fetch failure, as returned by the orchestrator and query cache.
///
/// `Clone` so a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// HTTP 4xx. Never retried.
    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    /// Network failure, 5xx or timeout.
    #[error("Transient failure: {message}")]
    Transient { status: Option<u16>, message: String },

    /// Provider response missing expected fields. Retried like a transient
    /// failure since a glitch looks the same as an outage from here.
    #[error("Malformed provider data: {0}")]
    DataShape(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::DataShape(_))
    }

    /// HTTP status, when the failure came from one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } => Some(*status),
            Self::Transient { status, .. } => *status,
            _ => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        AppError::from(self.clone()).user_message()
    }
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        let weather = match e {
            FetchError::Client { status, message } => WeatherError::Rejected { status, message },
            FetchError::Transient { message, .. } => WeatherError::Unavailable(message),
            FetchError::DataShape(message) => WeatherError::InvalidData(message),
            FetchError::Cancelled => WeatherError::Cancelled,
        };
        AppError::Weather(weather)
    }
}

/// The persistence medium could not be used. Treated exactly like an empty
/// store by callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Storage unavailable: {reason}")]
pub struct StorageUnavailable {
    pub reason: String,
}

impl StorageUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for StorageUnavailable {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}
