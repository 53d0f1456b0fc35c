use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Upper bound for `stale_minutes` and `cache_minutes` (one week)
pub const MAX_CACHE_MINUTES: u64 = 7 * 24 * 60;

/// Environment variable that overrides `weather.api_key`
pub const API_KEY_ENV: &str = "NIMBUS_OWM_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Provider and display settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Query cache freshness policies
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry/backoff schedule for upstream requests
    #[serde(default)]
    pub retry: RetrySettings,

    /// Offline snapshot settings
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Upstream weather provider, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenMeteo,
    OpenWeatherMap,
}

/// Unit system used for display. Data is always fetched and cached in metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Active provider
    #[serde(default)]
    pub provider: ProviderKind,

    /// API key (OpenWeatherMap only). Can also be set via `NIMBUS_OWM_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the provider's weather API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Override for the provider's geocoding API base URL
    #[serde(default)]
    pub geocoding_url: Option<String>,

    /// Display unit preference
    #[serde(default)]
    pub display_units: Units,

    /// Per-attempt HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Same as the default retry backoff ceiling
fn default_request_timeout() -> u64 {
    30
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenMeteo,
            api_key: None,
            base_url: None,
            geocoding_url: None,
            display_units: Units::Metric,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Stale/expiry pair for one kind of cached data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Minutes before an entry is considered stale
    pub stale_minutes: u64,
    /// Minutes before an entry is evicted
    pub cache_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_current_freshness")]
    pub current: FreshnessConfig,

    #[serde(default = "default_forecast_freshness")]
    pub forecast: FreshnessConfig,

    /// How often expired entries are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_current_freshness() -> FreshnessConfig {
    FreshnessConfig {
        stale_minutes: 8,
        cache_minutes: 15,
    }
}

fn default_forecast_freshness() -> FreshnessConfig {
    FreshnessConfig {
        stale_minutes: 30,
        cache_minutes: 60,
    }
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            current: default_current_freshness(),
            forecast: default_forecast_freshness(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (doubles each attempt)
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    1
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshots older than this are not used as a fallback
    #[serde(default = "default_snapshot_age")]
    pub max_age_hours: u64,
}

fn default_snapshot_age() -> u64 {
    24
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_snapshot_age(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            cache: CacheConfig::default(),
            retry: RetrySettings::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating a default file if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(dir) = config_path.parent() {
                config.config_dir = dir.to_path_buf();
            }
            config.save_to(config_path)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).map_err(|e| ConfigError::Unreadable {
                path: config_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// Validate, logging any warnings; errors fail the whole configuration
    pub fn check(&self) -> std::result::Result<ValidationResult, ConfigError> {
        let validation = self.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(validation)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, contents).context("Failed to write config file")?;

        tracing::info!("Saved configuration to {}", config_path.display());
        Ok(())
    }

    /// Path of the default config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");
        Ok(config_dir.join("config.toml"))
    }

    /// Directory backing the local key-value store (offline snapshot)
    pub fn storage_dir(&self) -> PathBuf {
        self.config_dir.join("storage")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.weather.api_key = Some(key);
            }
        }
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Some(url) = &self.weather.base_url {
            self.validate_url(url, "weather.base_url", &mut result);
        }
        if let Some(url) = &self.weather.geocoding_url {
            self.validate_url(url, "weather.geocoding_url", &mut result);
        }

        if self.weather.provider == ProviderKind::OpenWeatherMap
            && self
                .weather
                .api_key
                .as_deref()
                .map_or(true, |k| k.trim().is_empty())
        {
            result.add_error(
                "weather.api_key",
                format!("OpenWeatherMap requires an API key (set it here or via {API_KEY_ENV})"),
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        Self::validate_freshness(&self.cache.current, "cache.current", &mut result);
        Self::validate_freshness(&self.cache.forecast, "cache.forecast", &mut result);

        if self.cache.sweep_interval_secs == 0 {
            result.add_error(
                "cache.sweep_interval_secs",
                "Sweep interval must be greater than 0",
            );
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            result.add_error(
                "retry.max_delay_ms",
                "Maximum delay must not be smaller than the base delay",
            );
        }
        if self.retry.max_retries > 5 {
            result.add_warning(
                "retry.max_retries",
                "More than 5 retries delays offline fallback noticeably",
            );
        }

        if self.snapshot.max_age_hours == 0 {
            result.add_warning(
                "snapshot.max_age_hours",
                "Offline fallback disabled (0 hours)",
            );
        }

        result
    }

    fn validate_freshness(
        freshness: &FreshnessConfig,
        field_name: &str,
        result: &mut ValidationResult,
    ) {
        if freshness.stale_minutes > freshness.cache_minutes {
            result.add_error(
                field_name,
                "stale_minutes must not exceed cache_minutes",
            );
        }
        if freshness.cache_minutes == 0 {
            result.add_warning(field_name, "Caching disabled (0 minutes)");
        }
        if freshness.stale_minutes > MAX_CACHE_MINUTES || freshness.cache_minutes > MAX_CACHE_MINUTES {
            result.add_error(
                field_name,
                format!("Cache lifetimes must not exceed {} minutes", MAX_CACHE_MINUTES),
            );
        }
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.scheme() == "http" {
                    result.add_warning(field_name, "Using insecure HTTP");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "{}", result.error_summary());
    }

    #[test]
    fn test_default_freshness_policies() {
        let config = CacheConfig::default();
        assert_eq!(config.current.stale_minutes, 8);
        assert_eq!(config.current.cache_minutes, 15);
        assert_eq!(config.forecast.stale_minutes, 30);
        assert_eq!(config.forecast.cache_minutes, 60);
    }

    #[test]
    fn test_default_retry_settings() {
        let retry = RetrySettings::default();
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.base_delay_ms, 1000);
        assert_eq!(retry.max_delay_ms, 30_000);
    }

    #[test]
    fn test_stale_exceeding_cache_is_error() {
        let mut config = Config::default();
        config.cache.current = FreshnessConfig {
            stale_minutes: 20,
            cache_minutes: 10,
        };
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.error_summary().contains("cache.current"));
    }

    #[test]
    fn test_huge_cache_lifetime_is_error() {
        let mut config = Config::default();
        config.cache.forecast.stale_minutes = u64::MAX;
        config.cache.forecast.cache_minutes = u64::MAX;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.error_summary().contains("cache.forecast"));

        config.cache.forecast.stale_minutes = MAX_CACHE_MINUTES;
        config.cache.forecast.cache_minutes = MAX_CACHE_MINUTES;
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_owm_without_key_is_error() {
        let mut config = Config::default();
        config.weather.provider = ProviderKind::OpenWeatherMap;
        config.weather.api_key = None;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.error_summary().contains("weather.api_key"));

        config.weather.api_key = Some("abc123".to_string());
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.weather.base_url = Some("ftp://example.com".to_string());
        assert!(!config.validate().is_valid());

        config.weather.base_url = Some("not a url".to_string());
        assert!(!config.validate().is_valid());

        config.weather.base_url = Some("http://localhost:8080".to_string());
        let result = config.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_parse_partial_toml_uses_defaults() {
        let toml_str = r#"
            config_dir = "/tmp/nimbus"

            [weather]
            provider = "open_weather_map"
            api_key = "secret"
            display_units = "imperial"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.weather.provider, ProviderKind::OpenWeatherMap);
        assert_eq!(config.weather.display_units, Units::Imperial);
        assert_eq!(config.weather.request_timeout_secs, 30);
        assert_eq!(config.cache.forecast.stale_minutes, 30);
        assert_eq!(config.snapshot.max_age_hours, 24);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_dir, dir.path());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.weather.provider, config.weather.provider);
        assert_eq!(reloaded.storage_dir(), dir.path().join("storage"));
    }

    #[test]
    fn test_check_rejects_invalid_settings() {
        let mut config = Config::default();
        assert!(config.check().is_ok());

        config.retry.base_delay_ms = 5000;
        config.retry.max_delay_ms = 100;
        match config.check() {
            Err(ConfigError::Invalid(summary)) => assert!(summary.contains("retry.max_delay_ms")),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[weather\nprovider = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Malformed(_))
        ));
    }
}
