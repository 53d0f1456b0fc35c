use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Days covered by a forecast, today included
pub const FORECAST_DAYS: usize = 6;

/// Days shown in the outlook (forecast without today)
pub const OUTLOOK_DAYS: usize = 5;

/// Points in the short-term hourly temperature series
pub const HOURLY_POINTS: usize = 24;

/// Coordinates are rounded to this many steps per degree for cache identity
const COORDINATE_SCALE: f64 = 10_000.0;

/// Geographic point, optionally labelled for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            name: None,
            country: None,
        }
    }

    pub fn named(lat: f64, lon: f64, name: impl Into<String>, country: Option<String>) -> Self {
        Self {
            lat,
            lon,
            name: Some(name.into()),
            country,
        }
    }

    /// Coordinates rounded to a stable precision (1e-4 degrees).
    /// Two points that round to the same pair are the same location.
    pub fn rounded(&self) -> (i32, i32) {
        (
            (self.lat * COORDINATE_SCALE).round() as i32,
            (self.lon * COORDINATE_SCALE).round() as i32,
        )
    }

    /// Stable string identity, e.g. `"51.5000,-0.1200"`
    pub fn location_key(&self) -> String {
        let (lat, lon) = self.rounded();
        format!(
            "{:.4},{:.4}",
            f64::from(lat) / COORDINATE_SCALE,
            f64::from(lon) / COORDINATE_SCALE
        )
    }

    /// Human-readable label, falling back to coordinates
    pub fn display_name(&self) -> String {
        match (&self.name, &self.country) {
            (Some(name), Some(country)) if !country.is_empty() => format!("{}, {}", name, country),
            (Some(name), _) => name.clone(),
            _ => format!("{:.2}, {:.2}", self.lat, self.lon),
        }
    }
}

/// Shared condition categories every provider's codes are translated into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConditionCategory {
    Clear,
    Clouds,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
    Atmosphere,
    #[default]
    Unknown,
}

impl ConditionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Thunderstorm => "Thunderstorm",
            Self::Atmosphere => "Atmosphere",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ConditionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized weather condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionInfo {
    /// Provider-specific condition code
    pub id: i32,
    pub main: ConditionCategory,
    pub description: String,
    /// Day/night aware icon token, e.g. `01d` or `10n`
    pub icon: String,
}

impl ConditionInfo {
    pub fn is_night(&self) -> bool {
        self.icon.ends_with('n')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainReadings {
    /// °C (°F once converted to imperial)
    pub temp: f64,
    pub feels_like: f64,
    /// Relative humidity, percent
    pub humidity: u8,
    /// hPa
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// km/h (mph once converted to imperial)
    pub speed: f64,
    /// Degrees, meteorological convention
    pub deg: f64,
}

/// Current conditions in canonical (metric) units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalWeather {
    pub main: MainReadings,
    pub wind: Wind,
    /// Never empty once normalized
    pub weather: Vec<ConditionInfo>,
    /// Observation time, epoch seconds
    pub dt: i64,
    /// Offset from UTC in seconds
    pub timezone: i32,
    #[serde(default)]
    pub name: Option<String>,
}

impl CanonicalWeather {
    /// Primary condition
    pub fn condition(&self) -> Option<&ConditionInfo> {
        self.weather.first()
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.dt, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    pub condition: ConditionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    /// Epoch seconds
    pub time: i64,
    pub temp: f64,
}

/// Where the hourly series came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HourlySource {
    #[default]
    Provider,
    /// Generated because the provider response had no hourly data
    Synthetic,
}

/// Daily outlook plus short-term hourly trend, canonical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalForecast {
    pub daily: Vec<DailyEntry>,
    pub hourly: Vec<HourlyPoint>,
    #[serde(default)]
    pub hourly_source: HourlySource,
    /// Offset from UTC in seconds
    pub timezone: i32,
}

impl CanonicalForecast {
    /// The days after `today`, at most [`OUTLOOK_DAYS`] of them.
    pub fn outlook(&self, today: NaiveDate) -> impl Iterator<Item = &DailyEntry> {
        self.daily
            .iter()
            .filter(move |d| d.date > today)
            .take(OUTLOOK_DAYS)
    }
}

/// How a value reached the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataSource {
    /// Fresh from the upstream provider
    Network,
    /// Served from the offline snapshot because the network failed
    Snapshot {
        saved_at: DateTime<Utc>,
        location_key: String,
    },
}

/// A value tagged with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Fetched<T> {
    pub fn network(value: T) -> Self {
        Self {
            value,
            source: DataSource::Network,
        }
    }

    pub fn is_from_snapshot(&self) -> bool {
        matches!(self.source, DataSource::Snapshot { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            source: self.source,
        }
    }
}
