//! Normalized weather data and the provider payload it is built from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source tag attached to every report.
pub const SOURCE_TAG: &str = "US Weather MCP";

/// Format of [`WeatherReport::timestamp`] (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Round to one decimal place.
///
/// Rounds the exact binary value, with ties going to even.
pub fn round1(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}

/// `F = round(C × 9/5 + 32, 1)`.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    round1(celsius * 9.0 / 5.0 + 32.0)
}

/// `m/s = round(km/h ÷ 3.6, 1)`.
pub fn kmh_to_ms(kmh: f64) -> f64 {
    round1(kmh / 3.6)
}

/// A temperature in both scales.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    /// Degrees Celsius, as reported.
    pub celsius: f64,
    /// Degrees Fahrenheit, rounded to one decimal.
    pub fahrenheit: f64,
}

impl Temperature {
    /// Build from a Celsius reading.
    pub fn from_celsius(celsius: f64) -> Self {
        Self {
            celsius,
            fahrenheit: celsius_to_fahrenheit(celsius),
        }
    }
}

/// Unit-converted current conditions for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// The query as supplied by the caller.
    pub city: String,
    /// Air temperature.
    pub temperature: Temperature,
    /// Apparent temperature.
    pub feels_like: Temperature,
    /// Relative humidity, percent.
    pub humidity: u32,
    /// Condition text, e.g. "Partly cloudy".
    pub condition: String,
    /// Wind speed in metres per second.
    pub wind_speed_ms: f64,
    /// Visibility in kilometres.
    pub visibility_km: f64,
    /// Capture time, [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
    /// Always [`SOURCE_TAG`].
    pub source: String,
}

impl WeatherReport {
    /// Build a report from the provider's current conditions.
    ///
    /// Fails with a description of the first missing or non-numeric field.
    pub fn from_current(
        city: impl Into<String>,
        current: &CurrentCondition,
        timestamp: impl Into<String>,
    ) -> Result<Self, String> {
        let temp_c = number("temp_C", &current.temp_c)?;
        let feels_like_c = number("FeelsLikeC", &current.feels_like_c)?;
        let humidity = number("humidity", &current.humidity)?;
        let wind_kmh = number("windspeedKmph", &current.windspeed_kmph)?;
        let visibility = number("visibility", &current.visibility)?;

        if humidity.fract() != 0.0 || !(0.0..=u32::MAX as f64).contains(&humidity) {
            return Err(format!("field 'humidity' is not a whole percentage: {humidity}"));
        }

        let condition = current
            .weather_desc
            .first()
            .map(|desc| desc.value.clone())
            .ok_or_else(|| "field 'weatherDesc' is empty".to_string())?;

        Ok(Self {
            city: city.into(),
            temperature: Temperature::from_celsius(temp_c),
            feels_like: Temperature::from_celsius(feels_like_c),
            humidity: humidity as u32,
            condition,
            wind_speed_ms: kmh_to_ms(wind_kmh),
            visibility_km: visibility,
            timestamp: timestamp.into(),
            source: SOURCE_TAG.to_string(),
        })
    }
}

/// Read a numeric field the provider may send as a string or a number.
fn number(field: &str, value: &Value) -> Result<f64, String> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(format!("field '{field}' is not numeric: {value}")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider payload (wttr.in `format=j1`)
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level provider response; only the fields we read.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    /// Current conditions; the first entry is used.
    pub current_condition: Vec<CurrentCondition>,
}

/// One `current_condition` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentCondition {
    /// Temperature, °C.
    #[serde(rename = "temp_C")]
    pub temp_c: Value,
    /// Feels-like temperature, °C.
    #[serde(rename = "FeelsLikeC")]
    pub feels_like_c: Value,
    /// Humidity, percent.
    pub humidity: Value,
    /// Condition descriptions.
    #[serde(rename = "weatherDesc")]
    pub weather_desc: Vec<DescriptionValue>,
    /// Wind speed, km/h.
    #[serde(rename = "windspeedKmph")]
    pub windspeed_kmph: Value,
    /// Visibility, km.
    pub visibility: Value,
}

/// `{"value": "..."}` wrapper used by the provider for text fields.
#[derive(Debug, Clone, Deserialize)]
pub struct DescriptionValue {
    /// The text.
    pub value: String,
}


/// Property-based tests for unit conversions.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Round the exact decimal expansion of `value` to one place, ties to even.
    fn reference_round1(value: f64) -> f64 {
        // Sixty places are exact for the magnitudes converted here.
        let digits = format!("{:.60}", value.abs());
        let (int_part, frac) = digits.split_once('.').unwrap();
        let mut tenths: u64 = format!("{int_part}{}", &frac[..1]).parse().unwrap();
        let rest = &frac[1..];

        let half = format!("5{}", "0".repeat(rest.len() - 1));
        let round_up = match rest.cmp(half.as_str()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => tenths % 2 == 1,
            std::cmp::Ordering::Less => false,
        };
        if round_up {
            tenths += 1;
        }

        let magnitude = tenths as f64 / 10.0;
        if value.is_sign_negative() { -magnitude } else { magnitude }
    }

    /// Readings reported to hundredths, which land on rounding ties often.
    fn hundredths(low: i32, high: i32) -> impl Strategy<Value = f64> {
        (low..high).prop_map(|n| f64::from(n) / 100.0)
    }

    fn celsius_values() -> impl Strategy<Value = f64> {
        prop_oneof![hundredths(-9000, 6000), -90.0f64..60.0]
    }

    fn kmh_values() -> impl Strategy<Value = f64> {
        prop_oneof![hundredths(0, 50000), 0.0f64..500.0]
    }

    #[test]
    fn reference_rounds_known_ties() {
        assert_eq!(reference_round1(0.25), 0.2);
        assert_eq!(reference_round1(0.35), 0.3);
        assert_eq!(reference_round1(2.675), 2.7);
        assert_eq!(reference_round1(-1.25), -1.2);
    }

    #[test]
    fn conversions_round_ties_like_decimal() {
        assert_eq!(celsius_to_fahrenheit(-49.75), -57.5);
        assert_eq!(kmh_to_ms(497.7), 138.2);
    }

    proptest! {
        /// Property: Fahrenheit is the raw conversion correctly rounded to one decimal.
        #[test]
        fn fahrenheit_is_correctly_rounded(celsius in celsius_values()) {
            let raw = celsius * 9.0 / 5.0 + 32.0;
            prop_assert_eq!(
                celsius_to_fahrenheit(celsius).to_bits(),
                reference_round1(raw).to_bits(),
                "celsius={}, raw={}",
                celsius,
                raw
            );
        }

        /// Property: m/s is the raw conversion correctly rounded to one decimal.
        #[test]
        fn wind_speed_is_correctly_rounded(kmh in kmh_values()) {
            let raw = kmh / 3.6;
            prop_assert_eq!(
                kmh_to_ms(kmh).to_bits(),
                reference_round1(raw).to_bits(),
                "kmh={}, raw={}",
                kmh,
                raw
            );
        }
    }
}
