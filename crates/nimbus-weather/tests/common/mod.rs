//! Shared fixtures for the integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use nimbus_weather::{
    CanonicalForecast, CanonicalWeather, ConditionCategory, ConditionInfo, DailyEntry, GeoPoint,
    HourlyPoint, HourlySource, MainReadings, ProviderError, Units, WeatherSource, Wind,
};
use parking_lot::Mutex;

/// `WeatherSource` that replays scripted results and counts calls.
///
/// Once a script runs out, the fallback result for that operation repeats.
pub struct ScriptedSource {
    current: Mutex<VecDeque<Result<CanonicalWeather, ProviderError>>>,
    forecast: Mutex<VecDeque<Result<CanonicalForecast, ProviderError>>>,
    current_calls: AtomicUsize,
    forecast_calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(VecDeque::new()),
            forecast: Mutex::new(VecDeque::new()),
            current_calls: AtomicUsize::new(0),
            forecast_calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_current(&self, result: Result<CanonicalWeather, ProviderError>) -> &Self {
        self.current.lock().push_back(result);
        self
    }

    pub fn push_forecast(&self, result: Result<CanonicalForecast, ProviderError>) -> &Self {
        self.forecast.lock().push_back(result);
        self
    }

    pub fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    pub fn forecast_calls(&self) -> usize {
        self.forecast_calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl WeatherSource for ScriptedSource {
    async fn fetch_current(
        &self,
        _point: &GeoPoint,
        _units: Units,
    ) -> Result<CanonicalWeather, ProviderError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.current
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(weather(18.0)))
    }

    async fn fetch_forecast(
        &self,
        _point: &GeoPoint,
        _units: Units,
    ) -> Result<CanonicalForecast, ProviderError> {
        self.forecast_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.forecast
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(forecast(10.0, 20.0)))
    }

    async fn search_locations(&self, _query: &str) -> Result<Vec<GeoPoint>, ProviderError> {
        Ok(vec![london()])
    }
}

pub fn london() -> GeoPoint {
    GeoPoint::named(51.5, -0.12, "London", Some("GB".into()))
}

pub fn clear_sky() -> ConditionInfo {
    ConditionInfo {
        id: 0,
        main: ConditionCategory::Clear,
        description: "clear sky".into(),
        icon: "01d".into(),
    }
}

pub fn weather(temp: f64) -> CanonicalWeather {
    CanonicalWeather {
        main: MainReadings {
            temp,
            feels_like: temp - 1.0,
            humidity: 60,
            pressure: 1012.0,
        },
        wind: Wind {
            speed: 20.0,
            deg: 250.0,
        },
        weather: vec![clear_sky()],
        dt: 1_782_050_000,
        timezone: 3600,
        name: Some("London".into()),
    }
}

pub fn forecast(low: f64, high: f64) -> CanonicalForecast {
    let start = NaiveDate::from_ymd_opt(2026, 6, 21).unwrap();
    CanonicalForecast {
        daily: (0..6)
            .map(|i| DailyEntry {
                date: start + chrono::Duration::days(i),
                temp_min: low,
                temp_max: high,
                condition: clear_sky(),
            })
            .collect(),
        hourly: (0..24)
            .map(|h| HourlyPoint {
                time: 1_782_000_000 + h * 3600,
                temp: low + (high - low) * (h as f64) / 23.0,
            })
            .collect(),
        hourly_source: HourlySource::Provider,
        timezone: 3600,
    }
}

pub fn server_error() -> ProviderError {
    ProviderError::Status {
        status: 503,
        body: "Service Unavailable".into(),
    }
}

pub fn not_found() -> ProviderError {
    ProviderError::Status {
        status: 404,
        body: r#"{"cod":"404","message":"city not found"}"#.into(),
    }
}
