//! Sunrise/sunset approximation for choosing day or night icons when a
//! provider does not report it.
//!
//! Uses the solar declination for the day of year and the sunrise hour
//! angle; ignores the equation of time and refraction (error of a few
//! minutes, plenty for an icon).

use chrono::{DateTime, Datelike, Timelike};

const AXIAL_TILT_DEG: f64 = 23.44;

/// Whether the sun is above the horizon at `dt` (epoch seconds).
/// Unrepresentable timestamps count as day.
pub fn is_daytime(lat: f64, lon: f64, dt: i64) -> bool {
    let Some(time) = DateTime::from_timestamp(dt, 0) else {
        return true;
    };

    let day_of_year = f64::from(time.ordinal());
    let declination = AXIAL_TILT_DEG.to_radians()
        * ((360.0 / 365.0) * (day_of_year + 284.0)).to_radians().sin();

    let lat_rad = lat.clamp(-89.99, 89.99).to_radians();
    let cos_hour_angle = -lat_rad.tan() * declination.tan();

    // Midnight sun / polar night
    if cos_hour_angle <= -1.0 {
        return true;
    }
    if cos_hour_angle >= 1.0 {
        return false;
    }

    let half_day_hours = cos_hour_angle.acos().to_degrees() / 15.0;
    let solar_noon_utc = 12.0 - lon / 15.0;
    let hour_utc = f64::from(time.num_seconds_from_midnight()) / 3600.0;

    // Distance from solar noon wrapped into [-12, 12)
    let offset = (hour_utc - solar_noon_utc + 12.0).rem_euclid(24.0) - 12.0;
    offset.abs() < half_day_hours
}
