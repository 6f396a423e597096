//! # Telemetry Record Types
//!
//! Complete telemetry snapshots, robot positions, and the locomotion mode.
//!
//! A [`TelemetryRecord`] is always complete: every field carries a value.
//! Partial data from a transport arrives as a
//! [`Fragment`](super::fragment::Fragment) and is merged onto the previous
//! complete record before anything downstream sees it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConsoleError;

/// Locomotion mode of the robot.
///
/// The robot either flies (rotor mode) or drives on tracks. The mode shifts
/// the synthesized wind baseline and altitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Airborne rotor locomotion
    Flight,
    /// Ground locomotion on tracks
    #[default]
    Track,
}

impl Mode {
    /// Wire token used in `MODE:<token>` commands.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Flight => "FLIGHT",
            Mode::Track => "TRACK",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FLIGHT" => Ok(Mode::Flight),
            "TRACK" => Ok(Mode::Track),
            other => Err(ConsoleError::InvalidCommand(format!("unknown mode '{}'", other))),
        }
    }
}

/// One timestamped sensor snapshot.
///
/// Serialized with camelCase keys (`methaneRaw`, `windSpeed`, ...), the same
/// names transports use for the full-length fragment keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    /// Display timestamp (`HH:MM:SS`), ordered but not unique
    pub timestamp: String,

    // Gas channel
    /// Smoothed methane estimate (ppm)
    pub methane: f64,
    /// Unsmoothed methane reading (ppm)
    pub methane_raw: f64,

    // Environment
    /// Ambient temperature (°C)
    pub temperature: f64,
    /// Relative humidity (%)
    pub humidity: f64,
    /// Wind speed (m/s)
    pub wind_speed: f64,

    // Link health
    /// Battery charge (%)
    pub battery: f64,
    /// WiFi signal quality (%)
    pub wifi_signal: f64,

    /// Distance to the nearest obstacle (m)
    pub obstacle_distance: f64,

    // Localization quality
    /// Scan registration error
    pub slam_rmse: f64,
    /// Point density proxy, inversely related to `slam_rmse`
    pub feature_density: f64,

    /// Adaptive bandwidth of the gas-field model
    pub hydraulic_diameter: f64,

    // Terrain geometry
    /// Terrain slope (degrees)
    pub slope: f64,
    /// Step height (m)
    pub step_height: f64,
    /// Surface roughness (m)
    pub roughness: f64,

    /// Traversability verdict
    pub traversable: bool,
}

impl TelemetryRecord {
    /// Creates the record every merge starts from when nothing has been
    /// received yet: all numeric fields zero, terrain traversable.
    ///
    /// # Examples
    ///
    /// ```
    /// use robot_console::telemetry::record::TelemetryRecord;
    ///
    /// let record = TelemetryRecord::blank("12:00:00");
    /// assert_eq!(record.methane, 0.0);
    /// assert!(record.traversable);
    /// ```
    #[must_use]
    pub fn blank(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            methane: 0.0,
            methane_raw: 0.0,
            temperature: 0.0,
            humidity: 0.0,
            wind_speed: 0.0,
            battery: 0.0,
            wifi_signal: 0.0,
            obstacle_distance: 0.0,
            slam_rmse: 0.0,
            feature_density: 0.0,
            hydraulic_diameter: 0.0,
            slope: 0.0,
            step_height: 0.0,
            roughness: 0.0,
            traversable: true,
        }
    }
}

/// Robot pose on the map plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Map-plane X coordinate
    pub x: f64,
    /// Map-plane Y coordinate
    pub y: f64,
    /// Altitude, baseline depends on [`Mode`]
    pub z: f64,
    /// Heading in degrees, wrapped to `[0, 360)`
    pub heading: f64,
}

/// Rounds `value` to `decimals` places after the point.
///
/// Synthesized values are rounded once, at the source, to a field-specific
/// precision. Downstream code keeps the rounded value as-is.
///
/// # Examples
///
/// ```
/// use robot_console::telemetry::record::round_to;
///
/// assert_eq!(round_to(0.123_456, 3), 0.123);
/// assert_eq!(round_to(12.36, 1), 12.4);
/// ```
#[inline]
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Wraps an angle in degrees into `[0, 360)`.
#[inline]
#[must_use]
pub fn wrap_degrees(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_default_is_track() {
        assert_eq!(Mode::default(), Mode::Track);
    }

    #[test]
    fn test_mode_tokens() {
        assert_eq!(Mode::Flight.to_string(), "FLIGHT");
        assert_eq!(Mode::Track.to_string(), "TRACK");
    }

    #[test]
    fn test_mode_parse_case_insensitive() {
        assert_eq!("flight".parse::<Mode>().unwrap(), Mode::Flight);
        assert_eq!(" Track ".parse::<Mode>().unwrap(), Mode::Track);
        assert!("hover".parse::<Mode>().is_err());
    }

    #[test]
    fn test_blank_record_defaults() {
        let record = TelemetryRecord::blank("00:00:01");
        assert_eq!(record.timestamp, "00:00:01");
        assert_eq!(record.battery, 0.0);
        assert_eq!(record.slope, 0.0);
        assert!(record.traversable, "Blank record should default to traversable");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = TelemetryRecord::blank("t");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("methaneRaw").is_some());
        assert!(json.get("obstacleDistance").is_some());
        assert!(json.get("stepHeight").is_some());
        assert!(json.get("methane_raw").is_none());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.4567, 3), 0.457);
        assert_eq!(round_to(39.96, 1), 40.0);
        assert_eq!(round_to(-1.25, 0), -1.0);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(370.0), 10.0);
        assert_eq!(wrap_degrees(-90.0), 270.0);
        assert_eq!(wrap_degrees(360.0), 0.0);
    }
}
