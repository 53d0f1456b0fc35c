//! OpenWeatherMap adapter (API key required).
//! See: https://openweathermap.org/api

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use nimbus_core::Units;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use super::{get_json, HttpSettings, WeatherSource, SEARCH_LIMIT, STANDARD_PRESSURE_HPA};
use crate::conditions::{translate, OWM_CONDITIONS};
use crate::error::ProviderError;
use crate::solar;
use crate::types::{
    CanonicalForecast, CanonicalWeather, DailyEntry, GeoPoint, HourlyPoint, HourlySource,
    MainReadings, Wind, FORECAST_DAYS, HOURLY_POINTS,
};
use crate::units::{convert_forecast, convert_weather};

pub(super) const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// OWM reports wind in m/s even with `units=metric`
const KMH_PER_MS: f64 = 3.6;

#[derive(Clone)]
pub struct OpenWeatherMap {
    client: Client,
    settings: HttpSettings,
    api_key: String,
}

impl std::fmt::Debug for OpenWeatherMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherMap")
            .field("settings", &self.settings)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentResponse {
    #[serde(default)]
    weather: Vec<OwmCondition>,
    main: Option<OwmMain>,
    wind: Option<OwmWind>,
    dt: Option<i64>,
    #[serde(default)]
    timezone: i32,
    name: Option<String>,
    sys: Option<OwmSys>,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    id: i32,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastItem>,
    city: Option<OwmCity>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: OwmMain,
    #[serde(default)]
    weather: Vec<OwmCondition>,
}

#[derive(Debug, Deserialize)]
struct OwmCity {
    #[serde(default)]
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct GeoResult {
    name: String,
    lat: f64,
    lon: f64,
    country: Option<String>,
}

impl OpenWeatherMap {
    pub fn new(settings: HttpSettings, api_key: String) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenWeatherMap API key missing".into(),
            ));
        }

        Ok(Self {
            client: settings.build_client()?,
            settings,
            api_key,
        })
    }

    fn query(&self, point: &GeoPoint) -> Vec<(&'static str, String)> {
        vec![
            ("lat", point.lat.to_string()),
            ("lon", point.lon.to_string()),
            ("units", "metric".to_string()),
            ("appid", self.api_key.clone()),
        ]
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherMap {
    #[instrument(skip(self), level = "info")]
    async fn fetch_current(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalWeather, ProviderError> {
        let url = format!("{}/data/2.5/weather", self.settings.base_url);
        let body: CurrentResponse = get_json(&self.client, &url, &self.query(point)).await?;
        let weather = normalize_current(point, body)?;
        Ok(convert_weather(&weather, Units::Metric, units))
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_forecast(
        &self,
        point: &GeoPoint,
        units: Units,
    ) -> Result<CanonicalForecast, ProviderError> {
        let url = format!("{}/data/2.5/forecast", self.settings.base_url);
        let body: ForecastResponse = get_json(&self.client, &url, &self.query(point)).await?;
        let forecast = normalize_forecast(point, body)?;
        Ok(convert_forecast(&forecast, Units::Metric, units))
    }

    #[instrument(skip(self), level = "info")]
    async fn search_locations(&self, query: &str) -> Result<Vec<GeoPoint>, ProviderError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/geo/1.0/direct", self.settings.geocoding_url);
        let params = [
            ("q", query.to_string()),
            ("limit", SEARCH_LIMIT.to_string()),
            ("appid", self.api_key.clone()),
        ];

        let results: Option<Vec<GeoResult>> = get_json(&self.client, &url, &params).await?;
        Ok(results
            .unwrap_or_default()
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(|r| GeoPoint::named(r.lat, r.lon, r.name, r.country))
            .collect())
    }
}

/// Day/night from, in order: the icon suffix, reported sunrise/sunset, the
/// solar approximation.
fn resolve_is_day(point: &GeoPoint, dt: i64, icon: Option<&str>, sys: Option<&OwmSys>) -> bool {
    if let Some(icon) = icon {
        if icon.ends_with('d') {
            return true;
        }
        if icon.ends_with('n') {
            return false;
        }
    }
    if let Some((Some(sunrise), Some(sunset))) = sys.map(|s| (s.sunrise, s.sunset)) {
        return dt >= sunrise && dt < sunset;
    }
    solar::is_daytime(point.lat, point.lon, dt)
}

pub(crate) fn normalize_current(
    point: &GeoPoint,
    body: CurrentResponse,
) -> Result<CanonicalWeather, ProviderError> {
    let main = body
        .main
        .ok_or_else(|| ProviderError::Decode("missing 'main' block".into()))?;
    let temp = main
        .temp
        .ok_or_else(|| ProviderError::Decode("missing main.temp".into()))?;
    let condition = body
        .weather
        .first()
        .ok_or_else(|| ProviderError::Decode("empty 'weather' array".into()))?;
    let dt = body
        .dt
        .ok_or_else(|| ProviderError::Decode("missing 'dt'".into()))?;

    let is_day = resolve_is_day(point, dt, condition.icon.as_deref(), body.sys.as_ref());
    let wind = body.wind.unwrap_or(OwmWind {
        speed: None,
        deg: None,
    });

    Ok(CanonicalWeather {
        main: MainReadings {
            temp,
            feels_like: main.feels_like.unwrap_or(temp),
            humidity: main
                .humidity
                .map_or(0, |h| h.round().clamp(0.0, 100.0) as u8),
            pressure: main.pressure.unwrap_or(STANDARD_PRESSURE_HPA),
        },
        wind: Wind {
            speed: wind.speed.unwrap_or(0.0) * KMH_PER_MS,
            deg: wind.deg.unwrap_or(0.0),
        },
        weather: body
            .weather
            .iter()
            .map(|c| translate(OWM_CONDITIONS, c.id, is_day))
            .collect(),
        dt,
        timezone: body.timezone,
        name: body.name.or_else(|| point.name.clone()),
    })
}

/// Running aggregate of the 3-hourly items that fall on one local date
struct DayAccumulator {
    min: f64,
    max: f64,
    /// (distance from local noon in seconds, condition code)
    noon_code: (i64, i32),
}

pub(crate) fn normalize_forecast(
    point: &GeoPoint,
    body: ForecastResponse,
) -> Result<CanonicalForecast, ProviderError> {
    let offset = body.city.map_or(0, |c| c.timezone);

    let mut items: Vec<(i64, f64, f64, f64, i32)> = body
        .list
        .iter()
        .filter_map(|item| {
            let temp = item.main.temp?;
            let code = item.weather.first()?.id;
            Some((
                item.dt,
                temp,
                item.main.temp_min.unwrap_or(temp),
                item.main.temp_max.unwrap_or(temp),
                code,
            ))
        })
        .collect();
    items.sort_by_key(|i| i.0);

    if items.is_empty() {
        return Err(ProviderError::Decode("empty forecast list".into()));
    }

    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    for &(dt, _, min, max, code) in &items {
        let Some(local) = DateTime::<Utc>::from_timestamp(dt + i64::from(offset), 0) else {
            continue;
        };
        let from_noon = (i64::from(local.num_seconds_from_midnight()) - 12 * 3600).abs();
        days.entry(local.date_naive())
            .and_modify(|d| {
                d.min = d.min.min(min);
                d.max = d.max.max(max);
                if from_noon < d.noon_code.0 {
                    d.noon_code = (from_noon, code);
                }
            })
            .or_insert(DayAccumulator {
                min,
                max,
                noon_code: (from_noon, code),
            });
    }

    let daily: Vec<DailyEntry> = days
        .into_iter()
        .take(FORECAST_DAYS)
        .map(|(date, d)| DailyEntry {
            date,
            temp_min: d.min,
            temp_max: d.max,
            condition: translate(OWM_CONDITIONS, d.noon_code.1, true),
        })
        .collect();

    let samples: Vec<(i64, f64)> = items.iter().map(|i| (i.0, i.1)).collect();
    let hourly = interpolate_hourly(&samples);

    tracing::debug!(
        "Aggregated {} forecast items for {} into {} days",
        items.len(),
        point.location_key(),
        daily.len()
    );

    Ok(CanonicalForecast {
        daily,
        hourly,
        hourly_source: HourlySource::Provider,
        timezone: offset,
    })
}

/// Resample sorted `(time, temp)` samples to [`HOURLY_POINTS`] hourly points
/// by linear interpolation, holding the last value past the end.
fn interpolate_hourly(samples: &[(i64, f64)]) -> Vec<HourlyPoint> {
    let Some(&(start, _)) = samples.first() else {
        return Vec::new();
    };

    let mut segment = 0;
    (0..HOURLY_POINTS as i64)
        .map(|h| {
            let time = start + h * 3600;
            while segment + 1 < samples.len() && samples[segment + 1].0 <= time {
                segment += 1;
            }
            let (t0, v0) = samples[segment];
            let temp = match samples.get(segment + 1) {
                Some(&(t1, v1)) if t1 > t0 => v0 + (v1 - v0) * (time - t0) as f64 / (t1 - t0) as f64,
                _ => v0,
            };
            HourlyPoint {
                time,
                temp: (temp * 100.0).round() / 100.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::ConditionCategory;
    use chrono::TimeZone;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> OpenWeatherMap {
        OpenWeatherMap::new(
            HttpSettings {
                base_url: server.uri(),
                geocoding_url: server.uri(),
                timeout: Duration::from_secs(5),
            },
            "test_key".to_string(),
        )
        .unwrap()
    }

    fn current_json() -> serde_json::Value {
        serde_json::json!({
            "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10n"}],
            "main": {"temp": 11.3, "feels_like": 10.1, "pressure": 1002, "humidity": 87},
            "wind": {"speed": 5.0, "deg": 200},
            "dt": 1_782_000_000,
            "timezone": 3600,
            "name": "London"
        })
    }

    fn forecast_json() -> serde_json::Value {
        let start = Utc.with_ymd_and_hms(2026, 6, 21, 0, 0, 0).unwrap().timestamp();
        let list: Vec<serde_json::Value> = (0..40)
            .map(|i: i64| {
                let code = if i % 8 == 4 { 800 } else { 500 };
                serde_json::json!({
                    "dt": start + i * 3 * 3600,
                    "main": {
                        "temp": 10.0 + (i % 8) as f64,
                        "temp_min": 9.0 + (i % 8) as f64,
                        "temp_max": 11.0 + (i % 8) as f64
                    },
                    "weather": [{"id": code}]
                })
            })
            .collect();
        serde_json::json!({ "list": list, "city": { "timezone": 0 } })
    }

    #[test]
    fn test_normalize_current() {
        let body: CurrentResponse = serde_json::from_value(current_json()).unwrap();
        let weather = normalize_current(&GeoPoint::new(51.5, -0.12), body).unwrap();

        assert_eq!(weather.main.temp, 11.3);
        assert_eq!(weather.main.humidity, 87);
        assert!((weather.wind.speed - 18.0).abs() < 1e-9);
        assert_eq!(weather.weather[0].main, ConditionCategory::Rain);
        assert_eq!(weather.weather[0].icon, "10n");
        assert_eq!(weather.name.as_deref(), Some("London"));
    }

    #[test]
    fn test_normalize_current_substitutes_missing_readings() {
        let body: CurrentResponse = serde_json::from_value(serde_json::json!({
            "weather": [{"id": 800}],
            "main": {"temp": 20.0},
            "dt": 1_782_000_000,
            "sys": {"sunrise": 1_781_990_000, "sunset": 1_782_040_000}
        }))
        .unwrap();
        let weather = normalize_current(&GeoPoint::new(0.0, 0.0), body).unwrap();

        assert_eq!(weather.main.feels_like, 20.0);
        assert_eq!(weather.main.pressure, STANDARD_PRESSURE_HPA);
        // Between the reported sunrise and sunset
        assert_eq!(weather.weather[0].icon, "01d");
    }

    #[test]
    fn test_normalize_current_requires_condition() {
        let body: CurrentResponse = serde_json::from_value(serde_json::json!({
            "weather": [],
            "main": {"temp": 20.0},
            "dt": 1
        }))
        .unwrap();
        assert!(matches!(
            normalize_current(&GeoPoint::new(0.0, 0.0), body),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_normalize_forecast_aggregates_days() {
        let body: ForecastResponse = serde_json::from_value(forecast_json()).unwrap();
        let forecast = normalize_forecast(&GeoPoint::new(51.5, -0.12), body).unwrap();

        assert_eq!(forecast.daily.len(), 5);
        let first = &forecast.daily[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 6, 21).unwrap());
        assert_eq!(first.temp_min, 9.0);
        assert_eq!(first.temp_max, 18.0);
        // The 12:00 item carries code 800
        assert_eq!(first.condition.main, ConditionCategory::Clear);
    }

    #[test]
    fn test_interpolate_hourly() {
        let samples = [(0, 10.0), (3 * 3600, 13.0), (6 * 3600, 7.0)];
        let hourly = interpolate_hourly(&samples);

        assert_eq!(hourly.len(), HOURLY_POINTS);
        assert_eq!(hourly[1].temp, 11.0);
        assert_eq!(hourly[3].temp, 13.0);
        assert_eq!(hourly[4].temp, 11.0);
        // Held after the last sample
        assert_eq!(hourly[23].temp, 7.0);
    }

    #[tokio::test]
    async fn test_fetch_current_sends_key_and_units() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("appid", "test_key"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_json()))
            .expect(1)
            .mount(&server)
            .await;

        let weather = adapter(&server)
            .fetch_current(&GeoPoint::new(51.5, -0.12), Units::Metric)
            .await
            .unwrap();
        assert_eq!(weather.main.pressure, 1002.0);
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "cod": 401,
                "message": "Invalid API key"
            })))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .fetch_forecast(&GeoPoint::new(51.5, -0.12), Units::Metric)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_search_locations() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", "Paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "Paris", "lat": 48.8589, "lon": 2.32, "country": "FR", "state": "Ile-de-France"}
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", "Nowhere"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let owm = adapter(&server);
        let places = owm.search_locations("Paris").await.unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].display_name(), "Paris, FR");

        assert!(owm.search_locations("Nowhere").await.unwrap().is_empty());
    }
}
