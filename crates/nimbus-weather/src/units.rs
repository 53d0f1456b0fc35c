//! Display-unit conversion of canonical records.
//!
//! Pure functions over already-fetched data. Pressure is never converted;
//! only its display formatting differs between unit systems.

pub use nimbus_core::Units;

use crate::types::{CanonicalForecast, CanonicalWeather};

/// Kilometres per statute mile
pub const KMH_PER_MPH: f64 = 1.609_344;

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh / KMH_PER_MPH
}

pub fn mph_to_kmh(mph: f64) -> f64 {
    mph * KMH_PER_MPH
}

/// Convert a temperature between unit systems
pub fn convert_temperature(value: f64, from: Units, to: Units) -> f64 {
    match (from, to) {
        (Units::Metric, Units::Imperial) => celsius_to_fahrenheit(value),
        (Units::Imperial, Units::Metric) => fahrenheit_to_celsius(value),
        _ => value,
    }
}

/// Convert a wind speed between unit systems
pub fn convert_speed(value: f64, from: Units, to: Units) -> f64 {
    match (from, to) {
        (Units::Metric, Units::Imperial) => kmh_to_mph(value),
        (Units::Imperial, Units::Metric) => mph_to_kmh(value),
        _ => value,
    }
}

/// Convert current conditions. Same-unit conversion returns an identical record.
pub fn convert_weather(record: &CanonicalWeather, from: Units, to: Units) -> CanonicalWeather {
    let mut out = record.clone();
    if from == to {
        return out;
    }

    out.main.temp = convert_temperature(record.main.temp, from, to);
    out.main.feels_like = convert_temperature(record.main.feels_like, from, to);
    out.wind.speed = convert_speed(record.wind.speed, from, to);
    out
}

/// Convert every temperature in a forecast.
pub fn convert_forecast(forecast: &CanonicalForecast, from: Units, to: Units) -> CanonicalForecast {
    let mut out = forecast.clone();
    if from == to {
        return out;
    }

    for day in &mut out.daily {
        day.temp_min = convert_temperature(day.temp_min, from, to);
        day.temp_max = convert_temperature(day.temp_max, from, to);
    }
    for point in &mut out.hourly {
        point.temp = convert_temperature(point.temp, from, to);
    }
    out
}

/// Label for temperatures, e.g. `°C`
pub fn temperature_symbol(units: Units) -> &'static str {
    match units {
        Units::Metric => "°C",
        Units::Imperial => "°F",
    }
}

/// Label for wind speeds
pub fn speed_symbol(units: Units) -> &'static str {
    match units {
        Units::Metric => "km/h",
        Units::Imperial => "mph",
    }
}

/// Pressure formatted for display; the value itself is always hPa.
pub fn format_pressure(hpa: f64, units: Units) -> String {
    match units {
        Units::Metric => format!("{:.0} hPa", hpa),
        Units::Imperial => format!("{:.2} inHg", hpa * 0.029_53),
    }
}
