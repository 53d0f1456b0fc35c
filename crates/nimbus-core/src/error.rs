//! Centralized error types for Nimbus.
//!
//! Every error the weather layer can surface converts into [`AppError`],
//! which carries a user-facing message for display alongside the full
//! context for logging.

use thiserror::Error;

/// Anything the command line can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Short message for the terminal; the `Display` form goes to the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Io(_) => "Reading or writing local data failed.",
            AppError::Other(_) => "Something went wrong. Run with RUST_LOG=debug for details.",
        }
    }
}

/// Problems with the configuration file or its contents.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Malformed configuration: {0}")]
    Malformed(String),

    /// Parsed, but one or more settings failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Unreadable { .. } => "The configuration file could not be read.",
            ConfigError::Malformed(_) => "The configuration file is not valid TOML.",
            ConfigError::Invalid(_) => "Some settings are invalid. See the log for details.",
        }
    }
}

/// Weather service errors as seen by the application.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// The provider rejected the request (HTTP 4xx).
    #[error("Weather request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider could not be reached and no usable offline data exists.
    #[error("Weather service unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with data we could not understand.
    #[error("Unexpected weather data: {0}")]
    InvalidData(String),

    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::Rejected { status, .. } if *status == 401 || *status == 403 => {
                "Weather API key is invalid. Check settings."
            }
            WeatherError::Rejected { .. } => "The weather request was rejected. Check the location.",
            WeatherError::Unavailable(_) => {
                "Weather service unavailable. Check your connection and retry."
            }
            WeatherError::InvalidData(_) => "Weather service returned bad data. Please retry.",
            WeatherError::LocationNotFound(_) => "Location not found. Check and try again.",
            WeatherError::Cancelled => "Request cancelled.",
        }
    }
}
