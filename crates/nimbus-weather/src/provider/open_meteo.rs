//! Open-Meteo adapter. Free, no API key required.
//! See: https://open-meteo.com/en/docs

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use nimbus_core::Units;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use super::{get_json, synthetic_hourly, HttpSettings, WeatherSource, SEARCH_LIMIT, STANDARD_PRESSURE_HPA};
use crate::conditions::{translate, WMO_CONDITIONS};
use crate::error::ProviderError;
use crate::solar;
use crate::types::{
    CanonicalForecast, CanonicalWeather, DailyEntry, GeoPoint, HourlyPoint, HourlySource,
    MainReadings, Wind, FORECAST_DAYS, HOURLY_POINTS,
};
use crate::units::{convert_forecast, convert_weather};

pub(super) const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";
pub(super) const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,is_day,\
                              weathercode,surface_pressure,windspeed_10m,winddirection_10m";
const DAILY_FIELDS: &str = "weathercode,temperature_2m_max,temperature_2m_min";
const HOURLY_FIELDS: &str = "temperature_2m";
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone)]
pub struct OpenMeteo {
    client: Client,
    settings: HttpSettings,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    time: Option<String>,
    temperature_2m: Option<f64>,
    #[serde(alias = "weather_code")]
    weathercode: Option<i32>,
    relative_humidity_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    is_day: Option<u8>,
    #[serde(alias = "pressure_msl")]
    surface_pressure: Option<f64>,
    #[serde(alias = "wind_speed_10m")]
    windspeed_10m: Option<f64>,
    #[serde(alias = "wind_direction_10m")]
    winddirection_10m: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    daily: Option<DailyBlock>,
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<String>,
    #[serde(alias = "weather_code")]
    weathercode: Vec<Option<i32>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
}

impl OpenMeteo {
    pub fn new(settings: HttpSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            client: settings.build_client()?,
            settings,
        })
    }

    fn coordinates(point: &GeoPoint) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", point.lat.to_string()),
            ("longitude", point.lon.to_string()),
            ("timezone", "auto".to_string()),
            ("temperature_unit", "celsius".to_string()),
            ("windspeed_unit", "kmh".to_string()),
        ]
    }
}

#[async_trait]
impl WeatherSource for OpenMeteo {
    #[instrument(skip(self), level = "info")]
    async fn fetch_current(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalWeather, ProviderError> {
        let url = format!("{}/v1/forecast", self.settings.base_url);
        let mut query = Self::coordinates(point);
        query.push(("current", CURRENT_FIELDS.to_string()));

        let body: CurrentResponse = get_json(&self.client, &url, &query).await?;
        let weather = normalize_current(point, body, Utc::now().timestamp())?;
        Ok(convert_weather(&weather, Units::Metric, units))
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_forecast(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalForecast, ProviderError> {
        let url = format!("{}/v1/forecast", self.settings.base_url);
        let mut query = Self::coordinates(point);
        query.push(("daily", DAILY_FIELDS.to_string()));
        query.push(("hourly", HOURLY_FIELDS.to_string()));
        query.push(("forecast_days", FORECAST_DAYS.to_string()));

        let body: ForecastResponse = get_json(&self.client, &url, &query).await?;
        let forecast = normalize_forecast(point, body, Utc::now().timestamp())?;
        Ok(convert_forecast(&forecast, Units::Metric, units))
    }

    #[instrument(skip(self), level = "info")]
    async fn search_locations(&self, query: &str) -> Result<Vec<GeoPoint>, ProviderError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/search", self.settings.geocoding_url);
        let params = [
            ("name", query.to_string()),
            ("count", SEARCH_LIMIT.to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];

        let body: GeocodingResponse = get_json(&self.client, &url, &params).await?;
        let places: Vec<GeoPoint> = body
            .results
            .unwrap_or_default()
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(|r| GeoPoint::named(r.latitude, r.longitude, r.name, r.country))
            .collect();

        tracing::debug!("Search '{}' matched {} places", query, places.len());
        Ok(places)
    }
}

/// Local wall-clock time string (`2026-03-01T14:00`) to epoch seconds
fn local_to_epoch(time: &str, utc_offset: i32) -> Option<i64> {
    NaiveDateTime::parse_from_str(time, LOCAL_TIME_FORMAT)
        .ok()
        .map(|t| t.and_utc().timestamp() - i64::from(utc_offset))
}

pub(crate) fn normalize_current(
    point: &GeoPoint,
    body: CurrentResponse,
    now: i64,
) -> Result<CanonicalWeather, ProviderError> {
    let current = body
        .current
        .ok_or_else(|| ProviderError::Decode("missing 'current' block".into()))?;
    let temp = current
        .temperature_2m
        .ok_or_else(|| ProviderError::Decode("missing current.temperature_2m".into()))?;
    let code = current
        .weathercode
        .ok_or_else(|| ProviderError::Decode("missing current.weathercode".into()))?;

    let dt = current
        .time
        .as_deref()
        .and_then(|t| local_to_epoch(t, body.utc_offset_seconds))
        .unwrap_or(now);

    let is_day = match current.is_day {
        Some(flag) => flag != 0,
        None => solar::is_daytime(point.lat, point.lon, dt),
    };

    Ok(CanonicalWeather {
        main: MainReadings {
            temp,
            feels_like: current.apparent_temperature.unwrap_or(temp),
            humidity: current
                .relative_humidity_2m
                .map_or(0, |h| h.round().clamp(0.0, 100.0) as u8),
            pressure: current.surface_pressure.unwrap_or(STANDARD_PRESSURE_HPA),
        },
        wind: Wind {
            speed: current.windspeed_10m.unwrap_or(0.0),
            deg: current.winddirection_10m.unwrap_or(0.0),
        },
        weather: vec![translate(WMO_CONDITIONS, code, is_day)],
        dt,
        timezone: body.utc_offset_seconds,
        name: point.name.clone(),
    })
}

pub(crate) fn normalize_forecast(
    point: &GeoPoint,
    body: ForecastResponse,
    now: i64,
) -> Result<CanonicalForecast, ProviderError> {
    let daily_block = body
        .daily
        .ok_or_else(|| ProviderError::Decode("missing 'daily' block".into()))?;

    let daily: Vec<DailyEntry> = daily_block
        .time
        .iter()
        .zip(&daily_block.weathercode)
        .zip(daily_block.temperature_2m_max.iter().zip(&daily_block.temperature_2m_min))
        .filter_map(|((date, code), (max, min))| {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            Some(DailyEntry {
                date,
                temp_min: (*min)?,
                temp_max: (*max)?,
                condition: translate(WMO_CONDITIONS, (*code)?, true),
            })
        })
        .take(FORECAST_DAYS)
        .collect();

    if daily.is_empty() {
        return Err(ProviderError::Decode("no usable daily entries".into()));
    }

    let offset = body.utc_offset_seconds;
    let current_hour = now - now.rem_euclid(3600);
    let hourly: Vec<HourlyPoint> = body
        .hourly
        .map(|block| {
            block
                .time
                .iter()
                .zip(&block.temperature_2m)
                .filter_map(|(time, temp)| {
                    Some(HourlyPoint {
                        time: local_to_epoch(time, offset)?,
                        temp: (*temp)?,
                    })
                })
                .filter(|p| p.time >= current_hour)
                .take(HOURLY_POINTS)
                .collect()
        })
        .unwrap_or_default();

    let (hourly, hourly_source) = if hourly.is_empty() {
        tracing::debug!("No hourly data from Open-Meteo, generating synthetic series");
        let today = &daily[0];
        (
            synthetic_hourly(point, now, offset, today.temp_min, today.temp_max),
            HourlySource::Synthetic,
        )
    } else {
        (hourly, HourlySource::Provider)
    };

    Ok(CanonicalForecast {
        daily,
        hourly,
        hourly_source,
        timezone: offset,
    })
}
