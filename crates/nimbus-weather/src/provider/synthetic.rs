//! Fallback hourly series for provider responses without hourly data.
//!
//! Deterministic for a given location and start hour: a diurnal curve
//! between the day's low and high plus a small jitter from a hash of the
//! coordinates and timestamp.

use crate::types::{GeoPoint, HourlyPoint, HOURLY_POINTS};

/// Local hour of the daily temperature peak
const PEAK_HOUR: f64 = 15.0;
const JITTER_CELSIUS: f64 = 0.6;

/// Generate [`HOURLY_POINTS`] hourly temperatures starting at the hour
/// containing `start` (epoch seconds), oscillating between `low` and `high`.
pub fn synthetic_hourly(
    point: &GeoPoint,
    start: i64,
    utc_offset: i32,
    low: f64,
    high: f64,
) -> Vec<HourlyPoint> {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let mid = (low + high) / 2.0;
    let amplitude = (high - low) / 2.0;
    let (lat_key, lon_key) = point.rounded();
    let first_hour = start - start.rem_euclid(3600);

    (0..HOURLY_POINTS as i64)
        .map(|i| {
            let time = first_hour + i * 3600;
            let local_hour = ((time + i64::from(utc_offset)).rem_euclid(86_400) / 3600) as f64;
            let phase = (local_hour - PEAK_HOUR) / 24.0 * std::f64::consts::TAU;
            let jitter = (unit_noise(lat_key, lon_key, time) - 0.5) * JITTER_CELSIUS;
            let temp = mid + amplitude * phase.cos() + jitter;
            HourlyPoint {
                time,
                temp: (temp * 10.0).round() / 10.0,
            }
        })
        .collect()
}

/// Hash of the inputs mapped into [0, 1)
fn unit_noise(lat_key: i32, lon_key: i32, time: i64) -> f64 {
    let mut x = (i64::from(lat_key) as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (i64::from(lon_key) as u64).rotate_left(21)
        ^ (time as u64);
    // splitmix64 finalizer
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 53) as f64
}
