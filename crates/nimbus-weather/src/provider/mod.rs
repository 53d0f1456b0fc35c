//! Provider adapters.
//!
//! Each upstream service gets its own adapter that builds the requests and
//! normalizes responses into [`CanonicalWeather`] / [`CanonicalForecast`].
//! The active adapter is chosen once, in [`Provider::from_config`]; nothing
//! else looks at which provider is in use.

mod open_meteo;
mod open_weather_map;
mod synthetic;

pub use open_meteo::OpenMeteo;
pub use open_weather_map::OpenWeatherMap;
pub use synthetic::synthetic_hourly;

use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::{ProviderKind, Units, WeatherConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::types::{CanonicalForecast, CanonicalWeather, GeoPoint};

/// Substituted when a provider reports no barometric pressure (ISA sea level)
pub const STANDARD_PRESSURE_HPA: f64 = 1013.25;

/// Maximum number of results returned by a location search
pub const SEARCH_LIMIT: usize = 5;

const USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));

/// The capability every provider exposes.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Current conditions at `point`, expressed in `units`.
    async fn fetch_current(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalWeather, ProviderError>;

    /// Daily and hourly forecast at `point`, expressed in `units`.
    async fn fetch_forecast(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalForecast, ProviderError>;

    /// Places matching `query`. No match is an empty list, not an error.
    async fn search_locations(&self, query: &str) -> Result<Vec<GeoPoint>, ProviderError>;
}

/// Endpoint and client settings shared by the adapters
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    pub geocoding_url: String,
    pub timeout: Duration,
}

impl HttpSettings {
    pub(crate) fn build_client(&self) -> Result<Client, ProviderError> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::from)
    }
}

/// The active provider. One variant per supported upstream service.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenMeteo(OpenMeteo),
    OpenWeatherMap(OpenWeatherMap),
}

impl Provider {
    /// Build the adapter selected by configuration.
    pub fn from_config(config: &WeatherConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let provider = match config.provider {
            ProviderKind::OpenMeteo => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| open_meteo::DEFAULT_BASE_URL.to_string());
                let geocoding_url = config
                    .geocoding_url
                    .clone()
                    .unwrap_or_else(|| open_meteo::DEFAULT_GEOCODING_URL.to_string());
                Provider::OpenMeteo(OpenMeteo::new(HttpSettings {
                    base_url,
                    geocoding_url,
                    timeout,
                })?)
            }
            ProviderKind::OpenWeatherMap => {
                let api_key = config
                    .api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| {
                        ProviderError::NotConfigured("OpenWeatherMap API key missing".into())
                    })?;
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| open_weather_map::DEFAULT_BASE_URL.to_string());
                let geocoding_url = config.geocoding_url.clone().unwrap_or_else(|| base_url.clone());
                Provider::OpenWeatherMap(OpenWeatherMap::new(
                    HttpSettings {
                        base_url,
                        geocoding_url,
                        timeout,
                    },
                    api_key,
                )?)
            }
        };

        tracing::info!("Weather provider: {}", provider.name());
        Ok(provider)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenMeteo(_) => "open-meteo",
            Provider::OpenWeatherMap(_) => "openweathermap",
        }
    }
}

#[async_trait]
impl WeatherSource for Provider {
    async fn fetch_current(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalWeather, ProviderError> {
        match self {
            Provider::OpenMeteo(p) => p.fetch_current(point, units).await,
            Provider::OpenWeatherMap(p) => p.fetch_current(point, units).await,
        }
    }

    async fn fetch_forecast(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalForecast, ProviderError> {
        match self {
            Provider::OpenMeteo(p) => p.fetch_forecast(point, units).await,
            Provider::OpenWeatherMap(p) => p.fetch_forecast(point, units).await,
        }
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<GeoPoint>, ProviderError> {
        match self {
            Provider::OpenMeteo(p) => p.search_locations(query).await,
            Provider::OpenWeatherMap(p) => p.search_locations(query).await,
        }
    }
}

/// GET `url` and decode a JSON body. Non-2xx responses keep their status.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, ProviderError> {
    let response = client.get(url).query(query).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("{} returned status {}", url, status);
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ProviderError::from)
}
