//! # Telemetry Fragments
//!
//! Partial telemetry records as delivered by the transport links.
//!
//! ## Payload Formats
//!
//! A payload is either a JSON object or a flat list of `key:value` /
//! `key=value` pairs separated by commas, semicolons or whitespace:
//!
//! ```text
//! {"methane": 0.42, "t": 21.5, "rssi": 80}
//! m:0.42,t:21.5,b:87
//! m=0.42 h=44 ts=12:00:01
//! m: 0.42, t: 21.5
//! ```
//!
//! ## Keys
//!
//! | Field | Full key | Aliases |
//! |-------|----------|---------|
//! | methane | `methane` | `m` |
//! | methane raw | `methaneRaw` | `mr`, `raw` |
//! | temperature | `temperature` | `t`, `temp` |
//! | humidity | `humidity` | `h`, `hum` |
//! | wind speed | `windSpeed` | `w`, `wind` |
//! | battery | `battery` | `b`, `bat` |
//! | WiFi signal | `wifiSignal` | `rssi`, `s`, `wifi` |
//! | obstacle distance | `obstacleDistance` | `d`, `dist` |
//! | SLAM RMSE | `slamRmse` | `rmse` |
//! | feature density | `featureDensity` | `fd` |
//! | hydraulic diameter | `hydraulicDiameter` | `hd` |
//! | slope | `slope` | `sl` |
//! | step height | `stepHeight` | `sh`, `step` |
//! | roughness | `roughness` | `r`, `rough` |
//! | traversable | `traversable` | `trav` |
//! | timestamp | `timestamp` | `ts` |
//!
//! Keys match case-insensitively, and snake_case spellings of the full keys
//! are accepted. Unknown keys are ignored. A payload without a gas reading
//! (`methane` or `methaneRaw`) is not telemetry and is rejected.

use serde_json::Value;

use super::record::TelemetryRecord;
use crate::error::{ConsoleError, Result};

/// Telemetry field addressed by a fragment key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    Methane,
    MethaneRaw,
    Temperature,
    Humidity,
    WindSpeed,
    Battery,
    WifiSignal,
    ObstacleDistance,
    SlamRmse,
    FeatureDensity,
    HydraulicDiameter,
    Slope,
    StepHeight,
    Roughness,
    Traversable,
}

impl Field {
    /// Resolves a payload key (full name, snake_case name, or alias).
    ///
    /// # Examples
    ///
    /// ```
    /// use robot_console::telemetry::fragment::Field;
    ///
    /// assert_eq!(Field::from_key("rssi"), Some(Field::WifiSignal));
    /// assert_eq!(Field::from_key("methane_raw"), Some(Field::MethaneRaw));
    /// assert_eq!(Field::from_key("colour"), None);
    /// ```
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized: String = key
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let field = match normalized.as_str() {
            "timestamp" | "ts" => Field::Timestamp,
            "methane" | "m" => Field::Methane,
            "methaneraw" | "mr" | "raw" => Field::MethaneRaw,
            "temperature" | "t" | "temp" => Field::Temperature,
            "humidity" | "h" | "hum" => Field::Humidity,
            "windspeed" | "w" | "wind" => Field::WindSpeed,
            "battery" | "b" | "bat" => Field::Battery,
            "wifisignal" | "rssi" | "s" | "wifi" => Field::WifiSignal,
            "obstacledistance" | "d" | "dist" => Field::ObstacleDistance,
            "slamrmse" | "rmse" => Field::SlamRmse,
            "featuredensity" | "fd" => Field::FeatureDensity,
            "hydraulicdiameter" | "hd" => Field::HydraulicDiameter,
            "slope" | "sl" => Field::Slope,
            "stepheight" | "sh" | "step" => Field::StepHeight,
            "roughness" | "r" | "rough" => Field::Roughness,
            "traversable" | "trav" => Field::Traversable,
            _ => return None,
        };
        Some(field)
    }
}

/// A partial telemetry record.
///
/// Only the fields a transport actually reported are `Some`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub timestamp: Option<String>,
    pub methane: Option<f64>,
    pub methane_raw: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub battery: Option<f64>,
    pub wifi_signal: Option<f64>,
    pub obstacle_distance: Option<f64>,
    pub slam_rmse: Option<f64>,
    pub feature_density: Option<f64>,
    pub hydraulic_diameter: Option<f64>,
    pub slope: Option<f64>,
    pub step_height: Option<f64>,
    pub roughness: Option<f64>,
    pub traversable: Option<bool>,
}

impl Fragment {
    /// Creates an empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a transport payload into a fragment.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::MalformedFragment`] if the payload is empty,
    /// is invalid JSON, or carries no gas reading. In key/value text, tokens
    /// that are not pairs are skipped, and a key ending in `:` or `=` takes
    /// the following token as its value (`m: 0.42`).
    ///
    /// # Examples
    ///
    /// ```
    /// use robot_console::telemetry::fragment::Fragment;
    ///
    /// let fragment = Fragment::parse("m:0.42,b:87,colour:red").unwrap();
    /// assert_eq!(fragment.methane, Some(0.42));
    /// assert_eq!(fragment.battery, Some(87.0));
    ///
    /// // No gas key: not telemetry
    /// assert!(Fragment::parse("b:87").is_err());
    /// ```
    pub fn parse(payload: &str) -> Result<Self> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(ConsoleError::MalformedFragment("empty payload".to_string()));
        }

        let fragment = if payload.starts_with('{') {
            Self::parse_json(payload)?
        } else {
            Self::parse_pairs(payload)?
        };

        if !fragment.has_gas() {
            return Err(ConsoleError::MalformedFragment(
                "payload carries no gas reading".to_string(),
            ));
        }

        Ok(fragment)
    }

    fn parse_json(payload: &str) -> Result<Self> {
        let object: serde_json::Map<String, Value> = serde_json::from_str(payload)
            .map_err(|e| ConsoleError::MalformedFragment(format!("invalid JSON: {}", e)))?;

        let mut fragment = Self::new();
        for (key, value) in &object {
            let Some(field) = Field::from_key(key) else {
                continue;
            };
            match value {
                Value::Number(n) => {
                    if let Some(v) = n.as_f64() {
                        fragment.set_number(field, v);
                    }
                }
                Value::Bool(b) if field == Field::Traversable => {
                    fragment.traversable = Some(*b);
                }
                Value::String(s) => fragment.set_text(field, s),
                _ => {}
            }
        }
        Ok(fragment)
    }

    fn parse_pairs(payload: &str) -> Result<Self> {
        let mut fragment = Self::new();
        let mut tokens = payload
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty());

        while let Some(token) = tokens.next() {
            // Stray tokens are skipped like unknown keys
            let Some(split) = token.find([':', '=']) else {
                continue;
            };
            let key = &token[..split];
            let mut value = &token[split + 1..];
            // `m: 0.42` puts the value in the next token
            if value.is_empty() {
                value = tokens.next().unwrap_or_default();
            }
            if let Some(field) = Field::from_key(key) {
                fragment.set_text(field, value);
            }
        }
        Ok(fragment)
    }

    /// Sets a numeric field. Non-finite values are ignored.
    pub fn set_number(&mut self, field: Field, value: f64) {
        if !value.is_finite() {
            return;
        }
        let slot = match field {
            Field::Timestamp => return,
            Field::Traversable => {
                self.traversable = Some(value != 0.0);
                return;
            }
            Field::Methane => &mut self.methane,
            Field::MethaneRaw => &mut self.methane_raw,
            Field::Temperature => &mut self.temperature,
            Field::Humidity => &mut self.humidity,
            Field::WindSpeed => &mut self.wind_speed,
            Field::Battery => &mut self.battery,
            Field::WifiSignal => &mut self.wifi_signal,
            Field::ObstacleDistance => &mut self.obstacle_distance,
            Field::SlamRmse => &mut self.slam_rmse,
            Field::FeatureDensity => &mut self.feature_density,
            Field::HydraulicDiameter => &mut self.hydraulic_diameter,
            Field::Slope => &mut self.slope,
            Field::StepHeight => &mut self.step_height,
            Field::Roughness => &mut self.roughness,
        };
        *slot = Some(value);
    }

    /// Sets a field from its textual value. Unparseable numbers are ignored.
    fn set_text(&mut self, field: Field, value: &str) {
        let value = value.trim();
        match field {
            Field::Timestamp => {
                if !value.is_empty() {
                    self.timestamp = Some(value.to_string());
                }
            }
            Field::Traversable => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => self.traversable = Some(true),
                "false" | "0" | "no" => self.traversable = Some(false),
                _ => {}
            },
            _ => {
                if let Ok(v) = value.parse::<f64>() {
                    self.set_number(field, v);
                }
            }
        }
    }

    /// True if the fragment carries a gas reading.
    #[must_use]
    pub fn has_gas(&self) -> bool {
        self.methane.is_some() || self.methane_raw.is_some()
    }

    /// Merges this fragment onto a complete record.
    ///
    /// Fields present in the fragment replace the record's values; every
    /// other field, including `timestamp` and `traversable` when absent,
    /// keeps the prior value.
    ///
    /// # Examples
    ///
    /// ```
    /// use robot_console::telemetry::fragment::Fragment;
    /// use robot_console::telemetry::record::TelemetryRecord;
    ///
    /// let prior = TelemetryRecord::blank("12:00:00");
    /// let fragment = Fragment { battery: Some(42.0), ..Fragment::new() };
    ///
    /// let merged = fragment.apply_to(&prior);
    /// assert_eq!(merged.battery, 42.0);
    /// assert_eq!(merged.timestamp, prior.timestamp);
    /// ```
    #[must_use]
    pub fn apply_to(&self, prior: &TelemetryRecord) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: self
                .timestamp
                .clone()
                .unwrap_or_else(|| prior.timestamp.clone()),
            methane: self.methane.unwrap_or(prior.methane),
            methane_raw: self.methane_raw.unwrap_or(prior.methane_raw),
            temperature: self.temperature.unwrap_or(prior.temperature),
            humidity: self.humidity.unwrap_or(prior.humidity),
            wind_speed: self.wind_speed.unwrap_or(prior.wind_speed),
            battery: self.battery.unwrap_or(prior.battery),
            wifi_signal: self.wifi_signal.unwrap_or(prior.wifi_signal),
            obstacle_distance: self.obstacle_distance.unwrap_or(prior.obstacle_distance),
            slam_rmse: self.slam_rmse.unwrap_or(prior.slam_rmse),
            feature_density: self.feature_density.unwrap_or(prior.feature_density),
            hydraulic_diameter: self.hydraulic_diameter.unwrap_or(prior.hydraulic_diameter),
            slope: self.slope.unwrap_or(prior.slope),
            step_height: self.step_height.unwrap_or(prior.step_height),
            roughness: self.roughness.unwrap_or(prior.roughness),
            traversable: self.traversable.unwrap_or(prior.traversable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TelemetryRecord {
        TelemetryRecord {
            timestamp: "10:00:00".to_string(),
            methane: 0.55,
            methane_raw: 0.61,
            temperature: 21.4,
            humidity: 47.0,
            wind_speed: 1.2,
            battery: 88.0,
            wifi_signal: 73.0,
            obstacle_distance: 2.35,
            slam_rmse: 0.041,
            feature_density: 61.3,
            hydraulic_diameter: 3.42,
            slope: 12.5,
            step_height: 0.21,
            roughness: 0.032,
            traversable: true,
        }
    }

    #[test]
    fn test_battery_only_fragment_changes_only_battery() {
        let prior = sample_record();
        let fragment = Fragment {
            battery: Some(42.0),
            ..Fragment::new()
        };

        let merged = fragment.apply_to(&prior);

        let mut expected = prior.clone();
        expected.battery = 42.0;
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_empty_fragment_is_identity() {
        let prior = sample_record();
        assert_eq!(Fragment::new().apply_to(&prior), prior);
    }

    #[test]
    fn test_merge_onto_blank_defaults() {
        let blank = TelemetryRecord::blank("now");
        let fragment = Fragment::parse("m:0.3").unwrap();
        let merged = fragment.apply_to(&blank);

        assert_eq!(merged.methane, 0.3);
        assert_eq!(merged.temperature, 0.0);
        assert_eq!(merged.obstacle_distance, 0.0);
        assert!(merged.traversable);
        assert_eq!(merged.timestamp, "now");
    }

    #[test]
    fn test_parse_json_payload() {
        let fragment =
            Fragment::parse(r#"{"methane": 0.42, "temperature": 21.5, "rssi": 80, "traversable": false}"#)
                .unwrap();
        assert_eq!(fragment.methane, Some(0.42));
        assert_eq!(fragment.temperature, Some(21.5));
        assert_eq!(fragment.wifi_signal, Some(80.0));
        assert_eq!(fragment.traversable, Some(false));
        assert_eq!(fragment.battery, None);
    }

    #[test]
    fn test_parse_json_ignores_unknown_keys() {
        let fragment = Fragment::parse(r#"{"m": 0.2, "pressure": 1013, "label": "x"}"#).unwrap();
        assert_eq!(fragment.methane, Some(0.2));
        assert_eq!(
            fragment,
            Fragment {
                methane: Some(0.2),
                ..Fragment::new()
            }
        );
    }

    #[test]
    fn test_parse_json_string_numbers() {
        let fragment = Fragment::parse(r#"{"m": "0.25", "ts": "12:00:05"}"#).unwrap();
        assert_eq!(fragment.methane, Some(0.25));
        assert_eq!(fragment.timestamp.as_deref(), Some("12:00:05"));
    }

    #[test]
    fn test_parse_key_value_pairs() {
        let fragment = Fragment::parse("m:0.42,t:21.5,h:40;b=87 s=66").unwrap();
        assert_eq!(fragment.methane, Some(0.42));
        assert_eq!(fragment.temperature, Some(21.5));
        assert_eq!(fragment.humidity, Some(40.0));
        assert_eq!(fragment.battery, Some(87.0));
        assert_eq!(fragment.wifi_signal, Some(66.0));
    }

    #[test]
    fn test_parse_timestamp_with_colons() {
        let fragment = Fragment::parse("ts:12:00:01,m:0.1").unwrap();
        assert_eq!(fragment.timestamp.as_deref(), Some("12:00:01"));
    }

    #[test]
    fn test_parse_traversable_text() {
        assert_eq!(Fragment::parse("m:0.1,trav:0").unwrap().traversable, Some(false));
        assert_eq!(Fragment::parse("m:0.1,trav:true").unwrap().traversable, Some(true));
    }

    #[test]
    fn test_parse_methane_raw_counts_as_gas() {
        let fragment = Fragment::parse("raw:0.9").unwrap();
        assert_eq!(fragment.methane_raw, Some(0.9));
        assert!(fragment.has_gas());
    }

    #[test]
    fn test_parse_rejects_payload_without_gas() {
        let result = Fragment::parse("t:21.5,b:80");
        assert!(matches!(result, Err(ConsoleError::MalformedFragment(_))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Fragment::parse("").is_err());
        assert!(Fragment::parse("   ").is_err());
        assert!(Fragment::parse("hello world").is_err());
        assert!(Fragment::parse("{not json").is_err());
        assert!(Fragment::parse("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_parse_skips_unparseable_numbers() {
        let fragment = Fragment::parse("m:0.2,t:warm").unwrap();
        assert_eq!(fragment.temperature, None);
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let mut fragment = Fragment::new();
        fragment.set_number(Field::Methane, f64::NAN);
        fragment.set_number(Field::Battery, f64::INFINITY);
        assert_eq!(fragment, Fragment::new());
    }

    #[test]
    fn test_field_aliases() {
        let cases = [
            ("m", Field::Methane),
            ("METHANE", Field::Methane),
            ("t", Field::Temperature),
            ("h", Field::Humidity),
            ("b", Field::Battery),
            ("wifiSignal", Field::WifiSignal),
            ("wifi_signal", Field::WifiSignal),
            ("rssi", Field::WifiSignal),
            ("s", Field::WifiSignal),
            ("stepHeight", Field::StepHeight),
            ("ts", Field::Timestamp),
        ];
        for (key, field) in cases {
            assert_eq!(Field::from_key(key), Some(field), "key '{}'", key);
        }
    }

    #[test]
    fn test_parse_space_after_separator() {
        let fragment = Fragment::parse("m: 0.42, t: 21.5, b= 87").unwrap();
        assert_eq!(fragment.methane, Some(0.42));
        assert_eq!(fragment.temperature, Some(21.5));
        assert_eq!(fragment.battery, Some(87.0));
    }

    #[test]
    fn test_parse_skips_stray_tokens() {
        let fragment = Fragment::parse("OK m:0.3 t:20 #12").unwrap();
        assert_eq!(fragment.methane, Some(0.3));
        assert_eq!(fragment.temperature, Some(20.0));
    }

    #[test]
    fn test_parse_dangling_key_at_end() {
        let fragment = Fragment::parse("m:0.3 t:").unwrap();
        assert_eq!(fragment.methane, Some(0.3));
        assert_eq!(fragment.temperature, None);
    }
}
