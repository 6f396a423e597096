//! # Traversability Module
//!
//! Geometric pass/fail decision for terrain ahead of the robot.
//!
//! Terrain is traversable only when slope, step height, and roughness are
//! all strictly below their configured limits. A measurement equal to its
//! limit fails.
//!
//! ## Usage
//!
//! ```
//! use robot_console::traversability::{evaluate, AlgorithmConfig};
//!
//! let config = AlgorithmConfig::default();
//! assert!(evaluate(20.0, 0.1, 0.01, &config));
//! assert!(!evaluate(35.0, 0.1, 0.01, &config)); // slope tie fails
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, Result};

/// Allowed range for `max_slope` (degrees).
pub const MAX_SLOPE_RANGE: (f64, f64) = (10.0, 60.0);
/// Allowed range for `max_step_height` (m).
pub const MAX_STEP_HEIGHT_RANGE: (f64, f64) = (0.1, 0.8);
/// Allowed range for `max_roughness` (m).
pub const MAX_ROUGHNESS_RANGE: (f64, f64) = (0.01, 0.2);

/// Operator-tunable decision thresholds.
///
/// Replaced as a whole through [`Session::set_config`](crate::session::Session::set_config);
/// never edited field by field while the console runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Maximum slope in degrees
    #[serde(default = "default_max_slope")]
    pub max_slope: f64,
    /// Maximum step height in meters
    #[serde(default = "default_max_step_height")]
    pub max_step_height: f64,
    /// Maximum surface roughness in meters
    #[serde(default = "default_max_roughness")]
    pub max_roughness: f64,
}

fn default_max_slope() -> f64 { 35.0 }
fn default_max_step_height() -> f64 { 0.32 }
fn default_max_roughness() -> f64 { 0.05 }

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            max_slope: default_max_slope(),
            max_step_height: default_max_step_height(),
            max_roughness: default_max_roughness(),
        }
    }
}

impl AlgorithmConfig {
    /// Builds a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::InvalidThreshold`] for the first value outside
    /// its documented range. Values are never clamped.
    ///
    /// # Examples
    ///
    /// ```
    /// use robot_console::traversability::AlgorithmConfig;
    ///
    /// assert!(AlgorithmConfig::new(20.0, 0.2, 0.02).is_ok());
    /// assert!(AlgorithmConfig::new(70.0, 0.2, 0.02).is_err());
    /// ```
    pub fn new(max_slope: f64, max_step_height: f64, max_roughness: f64) -> Result<Self> {
        let config = Self {
            max_slope,
            max_step_height,
            max_roughness,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every threshold against its range (inclusive bounds).
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::InvalidThreshold`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        check_range("max_slope", self.max_slope, MAX_SLOPE_RANGE)?;
        check_range("max_step_height", self.max_step_height, MAX_STEP_HEIGHT_RANGE)?;
        check_range("max_roughness", self.max_roughness, MAX_ROUGHNESS_RANGE)?;
        Ok(())
    }
}

fn check_range(name: &'static str, value: f64, (min, max): (f64, f64)) -> Result<()> {
    // NaN fails both comparisons, so test for containment rather than exclusion
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConsoleError::InvalidThreshold {
            name,
            value,
            min,
            max,
        })
    }
}

/// Returns the traversability verdict for one set of terrain measurements.
///
/// Pure: the same inputs always give the same answer, whether the
/// measurements were synthesized or relayed from a transport.
#[inline]
#[must_use]
pub fn evaluate(slope: f64, step_height: f64, roughness: f64, config: &AlgorithmConfig) -> bool {
    slope < config.max_slope
        && step_height < config.max_step_height
        && roughness < config.max_roughness
}

/// Verdict plus per-axis headroom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraversabilityReport {
    /// `max_slope - slope`; positive means headroom
    pub slope_margin: f64,
    /// `max_step_height - step_height`
    pub step_margin: f64,
    /// `max_roughness - roughness`
    pub roughness_margin: f64,
    /// Same value [`evaluate`] returns
    pub traversable: bool,
}

impl TraversabilityReport {
    /// Axis closest to (or furthest past) its limit, relative to the limit.
    ///
    /// Returns the axis name and its margin as a fraction of the limit.
    #[must_use]
    pub fn tightest_axis(&self, config: &AlgorithmConfig) -> (&'static str, f64) {
        [
            ("slope", self.slope_margin / config.max_slope),
            ("step_height", self.step_margin / config.max_step_height),
            ("roughness", self.roughness_margin / config.max_roughness),
        ]
        .into_iter()
        .fold(("slope", f64::INFINITY), |best, axis| {
            if axis.1 < best.1 {
                axis
            } else {
                best
            }
        })
    }
}

/// Evaluates the measurements and reports the margin on each axis.
///
/// # Examples
///
/// ```
/// use robot_console::traversability::{assess, AlgorithmConfig};
///
/// let report = assess(30.0, 0.4, 0.01, &AlgorithmConfig::default());
/// assert!(!report.traversable);
/// assert!(report.step_margin < 0.0);
/// assert!(report.slope_margin > 0.0);
/// ```
#[must_use]
pub fn assess(
    slope: f64,
    step_height: f64,
    roughness: f64,
    config: &AlgorithmConfig,
) -> TraversabilityReport {
    TraversabilityReport {
        slope_margin: config.max_slope - slope,
        step_margin: config.max_step_height - step_height,
        roughness_margin: config.max_roughness - roughness,
        traversable: evaluate(slope, step_height, roughness, config),
    }
}
