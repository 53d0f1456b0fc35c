//! Provider condition codes translated into the shared
//! `{category, description, icon}` triple.
//!
//! Each provider owns one explicit table. Codes missing from a table map to
//! [`ConditionCategory::Unknown`].

use crate::types::{ConditionCategory, ConditionInfo};

/// One code in a provider's condition table
#[derive(Debug, Clone, Copy)]
pub struct ConditionRow {
    pub code: i32,
    pub category: ConditionCategory,
    pub description: &'static str,
    /// Icon stem; `d`/`n` is appended at translation time
    pub icon: &'static str,
}

const fn row(
    code: i32,
    category: ConditionCategory,
    description: &'static str,
    icon: &'static str,
) -> ConditionRow {
    ConditionRow {
        code,
        category,
        description,
        icon,
    }
}

const UNKNOWN_DESCRIPTION: &str = "unknown conditions";
const UNKNOWN_ICON: &str = "03";

use ConditionCategory::{Atmosphere, Clear, Clouds, Drizzle, Fog, Rain, Snow, Thunderstorm};

/// WMO weather interpretation codes as reported by Open-Meteo.
/// See: https://open-meteo.com/en/docs#weathervariables
///
/// Codes 0-3 (clear through overcast) all fall in the `Clear` category; the
/// icon still distinguishes cloud cover.
pub static WMO_CONDITIONS: &[ConditionRow] = &[
    row(0, Clear, "clear sky", "01"),
    row(1, Clear, "mainly clear", "01"),
    row(2, Clear, "partly cloudy", "02"),
    row(3, Clear, "overcast", "04"),
    row(45, Fog, "fog", "50"),
    row(48, Fog, "depositing rime fog", "50"),
    row(51, Drizzle, "light drizzle", "09"),
    row(53, Drizzle, "moderate drizzle", "09"),
    row(55, Drizzle, "dense drizzle", "09"),
    row(56, Drizzle, "light freezing drizzle", "09"),
    row(57, Drizzle, "dense freezing drizzle", "09"),
    row(61, Rain, "slight rain", "10"),
    row(63, Rain, "moderate rain", "10"),
    row(65, Rain, "heavy rain", "10"),
    row(66, Rain, "light freezing rain", "13"),
    row(67, Rain, "heavy freezing rain", "13"),
    row(71, Snow, "slight snow fall", "13"),
    row(73, Snow, "moderate snow fall", "13"),
    row(75, Snow, "heavy snow fall", "13"),
    row(77, Snow, "snow grains", "13"),
    row(80, Rain, "slight rain showers", "09"),
    row(81, Rain, "moderate rain showers", "09"),
    row(82, Rain, "violent rain showers", "09"),
    row(85, Snow, "slight snow showers", "13"),
    row(86, Snow, "heavy snow showers", "13"),
    row(95, Thunderstorm, "thunderstorm", "11"),
    row(96, Thunderstorm, "thunderstorm with slight hail", "11"),
    row(99, Thunderstorm, "thunderstorm with heavy hail", "11"),
];

/// OpenWeatherMap condition ids.
/// See: https://openweathermap.org/weather-conditions
pub static OWM_CONDITIONS: &[ConditionRow] = &[
    row(200, Thunderstorm, "thunderstorm with light rain", "11"),
    row(201, Thunderstorm, "thunderstorm with rain", "11"),
    row(202, Thunderstorm, "thunderstorm with heavy rain", "11"),
    row(210, Thunderstorm, "light thunderstorm", "11"),
    row(211, Thunderstorm, "thunderstorm", "11"),
    row(212, Thunderstorm, "heavy thunderstorm", "11"),
    row(221, Thunderstorm, "ragged thunderstorm", "11"),
    row(230, Thunderstorm, "thunderstorm with light drizzle", "11"),
    row(231, Thunderstorm, "thunderstorm with drizzle", "11"),
    row(232, Thunderstorm, "thunderstorm with heavy drizzle", "11"),
    row(300, Drizzle, "light intensity drizzle", "09"),
    row(301, Drizzle, "drizzle", "09"),
    row(302, Drizzle, "heavy intensity drizzle", "09"),
    row(310, Drizzle, "light intensity drizzle rain", "09"),
    row(311, Drizzle, "drizzle rain", "09"),
    row(312, Drizzle, "heavy intensity drizzle rain", "09"),
    row(313, Drizzle, "shower rain and drizzle", "09"),
    row(314, Drizzle, "heavy shower rain and drizzle", "09"),
    row(321, Drizzle, "shower drizzle", "09"),
    row(500, Rain, "light rain", "10"),
    row(501, Rain, "moderate rain", "10"),
    row(502, Rain, "heavy intensity rain", "10"),
    row(503, Rain, "very heavy rain", "10"),
    row(504, Rain, "extreme rain", "10"),
    row(511, Rain, "freezing rain", "13"),
    row(520, Rain, "light intensity shower rain", "09"),
    row(521, Rain, "shower rain", "09"),
    row(522, Rain, "heavy intensity shower rain", "09"),
    row(531, Rain, "ragged shower rain", "09"),
    row(600, Snow, "light snow", "13"),
    row(601, Snow, "snow", "13"),
    row(602, Snow, "heavy snow", "13"),
    row(611, Snow, "sleet", "13"),
    row(612, Snow, "light shower sleet", "13"),
    row(613, Snow, "shower sleet", "13"),
    row(615, Snow, "light rain and snow", "13"),
    row(616, Snow, "rain and snow", "13"),
    row(620, Snow, "light shower snow", "13"),
    row(621, Snow, "shower snow", "13"),
    row(622, Snow, "heavy shower snow", "13"),
    row(701, Atmosphere, "mist", "50"),
    row(711, Atmosphere, "smoke", "50"),
    row(721, Atmosphere, "haze", "50"),
    row(731, Atmosphere, "sand/dust whirls", "50"),
    row(741, Fog, "fog", "50"),
    row(751, Atmosphere, "sand", "50"),
    row(761, Atmosphere, "dust", "50"),
    row(762, Atmosphere, "volcanic ash", "50"),
    row(771, Atmosphere, "squalls", "50"),
    row(781, Atmosphere, "tornado", "50"),
    row(800, Clear, "clear sky", "01"),
    row(801, Clouds, "few clouds", "02"),
    row(802, Clouds, "scattered clouds", "03"),
    row(803, Clouds, "broken clouds", "04"),
    row(804, Clouds, "overcast clouds", "04"),
];

/// Translate `code` through `table`, choosing the day or night icon.
pub fn translate(table: &[ConditionRow], code: i32, is_day: bool) -> ConditionInfo {
    let suffix = if is_day { 'd' } else { 'n' };

    match table.iter().find(|r| r.code == code) {
        Some(r) => ConditionInfo {
            id: code,
            main: r.category,
            description: r.description.to_string(),
            icon: format!("{}{}", r.icon, suffix),
        },
        None => {
            tracing::debug!("Unmapped condition code {}", code);
            ConditionInfo {
                id: code,
                main: ConditionCategory::Unknown,
                description: UNKNOWN_DESCRIPTION.to_string(),
                icon: format!("{}{}", UNKNOWN_ICON, suffix),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(table: &[ConditionRow], code: i32) -> ConditionCategory {
        translate(table, code, true).main
    }

    #[test]
    fn test_wmo_clear_through_overcast() {
        for code in 0..=3 {
            assert_eq!(category(WMO_CONDITIONS, code), ConditionCategory::Clear);
        }
        assert_eq!(translate(WMO_CONDITIONS, 3, true).description, "overcast");
        assert_eq!(translate(WMO_CONDITIONS, 3, true).icon, "04d");
    }

    #[test]
    fn test_wmo_fog() {
        assert_eq!(category(WMO_CONDITIONS, 45), ConditionCategory::Fog);
        assert_eq!(category(WMO_CONDITIONS, 48), ConditionCategory::Fog);
    }

    #[test]
    fn test_wmo_precipitation() {
        assert_eq!(category(WMO_CONDITIONS, 53), ConditionCategory::Drizzle);
        assert_eq!(category(WMO_CONDITIONS, 63), ConditionCategory::Rain);
        assert_eq!(category(WMO_CONDITIONS, 82), ConditionCategory::Rain);
        assert_eq!(category(WMO_CONDITIONS, 75), ConditionCategory::Snow);
        assert_eq!(category(WMO_CONDITIONS, 86), ConditionCategory::Snow);
        assert_eq!(category(WMO_CONDITIONS, 99), ConditionCategory::Thunderstorm);
    }

    #[test]
    fn test_unmapped_code_is_unknown() {
        let info = translate(WMO_CONDITIONS, 999, false);
        assert_eq!(info.main, ConditionCategory::Unknown);
        assert_eq!(info.id, 999);
        assert_eq!(info.icon, "03n");
        assert_eq!(category(OWM_CONDITIONS, -1), ConditionCategory::Unknown);
        // WMO code in the OWM table is not a match
        assert_eq!(category(OWM_CONDITIONS, 3), ConditionCategory::Unknown);
    }

    #[test]
    fn test_owm_groups() {
        assert_eq!(category(OWM_CONDITIONS, 211), ConditionCategory::Thunderstorm);
        assert_eq!(category(OWM_CONDITIONS, 301), ConditionCategory::Drizzle);
        assert_eq!(category(OWM_CONDITIONS, 501), ConditionCategory::Rain);
        assert_eq!(category(OWM_CONDITIONS, 601), ConditionCategory::Snow);
        assert_eq!(category(OWM_CONDITIONS, 741), ConditionCategory::Fog);
        assert_eq!(category(OWM_CONDITIONS, 701), ConditionCategory::Atmosphere);
        assert_eq!(category(OWM_CONDITIONS, 800), ConditionCategory::Clear);
        assert_eq!(category(OWM_CONDITIONS, 804), ConditionCategory::Clouds);
    }

    #[test]
    fn test_day_night_icon() {
        assert_eq!(translate(OWM_CONDITIONS, 800, true).icon, "01d");
        let night = translate(OWM_CONDITIONS, 800, false);
        assert_eq!(night.icon, "01n");
        assert!(night.is_night());
    }

    #[test]
    fn test_tables_have_unique_codes() {
        for table in [WMO_CONDITIONS, OWM_CONDITIONS] {
            let mut codes: Vec<i32> = table.iter().map(|r| r.code).collect();
            let len = codes.len();
            codes.sort_unstable();
            codes.dedup();
            assert_eq!(codes.len(), len);
        }
    }
}
