//! # Telemetry Synthesizer
//!
//! Produces plausible telemetry when no robot is connected, so the console
//! stays exercisable without hardware.
//!
//! Every call to [`Synthesizer::synthesize`] advances an internal tick
//! counter `k` by one. Signals are smooth functions of `k` plus bounded
//! uniform noise drawn from a seedable RNG, so two synthesizers built with
//! the same seed produce identical streams.
//!
//! ## Signals (tick `k`)
//!
//! | Channel | Formula |
//! |---------|---------|
//! | methane | `max(0, 0.4 + 0.3·sin(0.1k))` |
//! | methane raw | `max(0, 0.4 + 0.3·sin(0.1k) + U(-0.2, 0.2))` |
//! | feature density | `max(0, 50 + 30·sin(0.2k) + U(0, 10))` |
//! | SLAM RMSE | `max(0.02, 5 / (density + 10) + U(0, 0.01))` |
//! | slope | `|sin(0.3k)|·40` |
//! | step height | `|cos(0.4k)|·0.4` |
//! | roughness | `U(0, 0.08)` |
//! | hydraulic diameter | `3 + sin(0.05k)` |
//!
//! Temperature, humidity, WiFi signal and obstacle distance follow a slow
//! sinusoid plus a bounded random walk: each tick the walk offset moves by
//! at most its step and never leaves `±limit`, so readings drift instead of
//! jumping between ticks.
//!
//! The robot orbits a fixed center at angle `0.05k`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::telemetry::record::{round_to, wrap_degrees, Mode, Position, TelemetryRecord};
use crate::traversability::{evaluate, AlgorithmConfig};

/// Angular speed of the synthetic orbit (radians per tick).
pub const ORBIT_STEP_RAD: f64 = 0.05;

/// Altitude reported while flying (m).
pub const FLIGHT_ALTITUDE: f64 = 2.5;
/// Altitude reported while on tracks (m).
pub const TRACK_ALTITUDE: f64 = 0.2;

/// Battery drain per tick (%).
const BATTERY_DRAIN_PER_TICK: f64 = 0.02;

/// Random-walk offset that moves by at most `step` per tick and stays
/// within `±limit`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Walk {
    offset: f64,
    step: f64,
    limit: f64,
}

impl Walk {
    const fn new(step: f64, limit: f64) -> Self {
        Self {
            offset: 0.0,
            step,
            limit,
        }
    }

    fn advance<R: Rng>(&mut self, rng: &mut R) -> f64 {
        self.offset = (self.offset + rng.random_range(-self.step..=self.step)).clamp(-self.limit, self.limit);
        self.offset
    }
}

/// Per-channel walks (°C, %, %, m).
const TEMPERATURE_WALK: Walk = Walk::new(0.1, 0.5);
const HUMIDITY_WALK: Walk = Walk::new(0.3, 2.0);
const WIFI_WALK: Walk = Walk::new(1.5, 5.0);
const OBSTACLE_WALK: Walk = Walk::new(0.05, 0.2);

/// Circular path the synthetic robot follows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    /// Center X on the map plane
    pub center_x: f64,
    /// Center Y on the map plane
    pub center_y: f64,
    /// Orbit radius
    pub radius: f64,
}

impl Default for Orbit {
    fn default() -> Self {
        Self {
            center_x: 50.0,
            center_y: 50.0,
            radius: 30.0,
        }
    }
}

impl Orbit {
    /// Point on the orbit at `angle` radians.
    #[must_use]
    pub fn point_at(&self, angle: f64) -> (f64, f64) {
        (
            self.center_x + self.radius * angle.cos(),
            self.center_y + self.radius * angle.sin(),
        )
    }
}

/// Synthetic telemetry generator.
///
/// State is the tick counter, the RNG and the ancillary walk offsets.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    tick: u64,
    orbit: Orbit,
    rng: StdRng,
    temperature: Walk,
    humidity: Walk,
    wifi: Walk,
    obstacle: Walk,
}

impl Synthesizer {
    /// Creates a synthesizer with a fixed seed.
    ///
    /// # Examples
    ///
    /// ```
    /// use robot_console::synth::{Orbit, Synthesizer};
    /// use robot_console::telemetry::record::Mode;
    /// use robot_console::traversability::AlgorithmConfig;
    ///
    /// let mut a = Synthesizer::with_seed(Orbit::default(), 7);
    /// let mut b = Synthesizer::with_seed(Orbit::default(), 7);
    /// let config = AlgorithmConfig::default();
    ///
    /// let (ra, pa) = a.synthesize(Mode::Track, &config, "t");
    /// let (rb, pb) = b.synthesize(Mode::Track, &config, "t");
    /// assert_eq!(ra, rb);
    /// assert_eq!(pa, pb);
    /// ```
    #[must_use]
    pub fn with_seed(orbit: Orbit, seed: u64) -> Self {
        Self::with_rng(orbit, StdRng::seed_from_u64(seed))
    }

    /// Creates a synthesizer seeded from OS entropy.
    #[must_use]
    pub fn from_entropy(orbit: Orbit) -> Self {
        Self::with_rng(orbit, StdRng::from_os_rng())
    }

    fn with_rng(orbit: Orbit, rng: StdRng) -> Self {
        Self {
            tick: 0,
            orbit,
            rng,
            temperature: TEMPERATURE_WALK,
            humidity: HUMIDITY_WALK,
            wifi: WIFI_WALK,
            obstacle: OBSTACLE_WALK,
        }
    }

    /// Number of ticks synthesized so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    #[must_use]
    pub fn orbit(&self) -> &Orbit {
        &self.orbit
    }

    /// Produces one complete record and one position, then advances the tick.
    ///
    /// Values are rounded to their display precision before the
    /// traversability verdict is computed, so the verdict always agrees with
    /// the numbers the record carries.
    pub fn synthesize(
        &mut self,
        mode: Mode,
        config: &AlgorithmConfig,
        timestamp: &str,
    ) -> (TelemetryRecord, Position) {
        let k = self.tick as f64;

        // Gas: the smoothed channel never sees the noise term
        let base = 0.4 + 0.3 * (0.1 * k).sin();
        let methane_raw = (base + self.rng.random_range(-0.2..=0.2)).max(0.0);
        let methane = base.max(0.0);

        // Localization
        let feature_density =
            (50.0 + 30.0 * (0.2 * k).sin() + self.rng.random_range(0.0..10.0)).max(0.0);
        let slam_rmse = ((100.0 / (feature_density + 10.0)) * 0.05
            + self.rng.random_range(0.0..0.01))
        .max(0.02);

        // Terrain geometry
        let slope = round_to((0.3 * k).sin().abs() * 40.0, 1);
        let step_height = round_to((0.4 * k).cos().abs() * 0.4, 2);
        let roughness = round_to(self.rng.random_range(0.0..0.08), 3);

        let hydraulic_diameter = 3.0 + (0.05 * k).sin();

        // Ancillary channels
        let temperature = 22.0 + 2.0 * (0.02 * k).sin() + self.temperature.advance(&mut self.rng);
        let humidity =
            (45.0 + 5.0 * (0.03 * k).cos() + self.humidity.advance(&mut self.rng)).clamp(0.0, 100.0);
        let wind_base = match mode {
            Mode::Flight => 3.0,
            Mode::Track => 0.8,
        };
        let wind_speed =
            (wind_base + 1.5 * (0.07 * k).sin().abs() + self.rng.random_range(0.0..0.5)).max(0.0);
        let battery = (100.0 - BATTERY_DRAIN_PER_TICK * k).max(0.0);
        let wifi_signal =
            (75.0 + 15.0 * (0.04 * k).sin() + self.wifi.advance(&mut self.rng)).clamp(0.0, 100.0);
        let obstacle_distance =
            (2.5 + 2.0 * (0.15 * k).sin() + self.obstacle.advance(&mut self.rng)).max(0.05);

        let record = TelemetryRecord {
            timestamp: timestamp.to_string(),
            methane: round_to(methane, 3),
            methane_raw: round_to(methane_raw, 3),
            temperature: round_to(temperature, 1),
            humidity: round_to(humidity, 1),
            wind_speed: round_to(wind_speed, 1),
            battery: round_to(battery, 1),
            wifi_signal: round_to(wifi_signal, 0),
            obstacle_distance: round_to(obstacle_distance, 2),
            slam_rmse: round_to(slam_rmse, 3),
            feature_density: round_to(feature_density, 1),
            hydraulic_diameter: round_to(hydraulic_diameter, 2),
            slope,
            step_height,
            roughness,
            traversable: evaluate(slope, step_height, roughness, config),
        };

        let position = self.position_at(k, mode);

        self.tick += 1;
        (record, position)
    }

    fn position_at(&self, k: f64, mode: Mode) -> Position {
        let angle = ORBIT_STEP_RAD * k;
        let (x, y) = self.orbit.point_at(angle);
        let z = match mode {
            Mode::Flight => FLIGHT_ALTITUDE,
            Mode::Track => TRACK_ALTITUDE,
        };
        // Rounding can push 359.96 up to 360.0
        let heading = round_to(wrap_degrees(angle.to_degrees() + 90.0), 1);
        Position {
            x: round_to(x, 2),
            y: round_to(y, 2),
            z,
            heading: if heading >= 360.0 { 0.0 } else { heading },
        }
    }
}
