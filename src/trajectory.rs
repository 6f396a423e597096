//! # Trajectory Tracker
//!
//! Bounded, ordered sequence of map-plane samples annotated with a risk
//! scalar, consumed by the heat-map view.
//!
//! The risk stored with each point is the governing record's smoothed
//! methane value, unscaled and unclamped. Use
//! [`TrajectoryPoint::clamped_risk`] when a strict `[0, 1]` value is needed.

use rand::Rng;
use std::f64::consts::TAU;

use crate::synth::Orbit;
use crate::telemetry::history::BoundedBuffer;
use crate::telemetry::record::{round_to, Position};

/// Number of points kept in the trajectory.
pub const TRAJECTORY_CAPACITY: usize = 100;

/// Base risk inside the engineered high-risk quadrant of the seed path.
const SEED_HIGH_RISK: f64 = 0.8;
/// Base risk everywhere else on the seed path.
const SEED_LOW_RISK: f64 = 0.1;
/// Upper bound of the uniform jitter added to seed risk.
const SEED_JITTER: f64 = 0.1;

/// One trajectory sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    /// Risk scalar, nominally `[0, 1]` but not enforced
    pub risk_level: f64,
    /// Display timestamp; `None` for seed points
    pub timestamp: Option<String>,
}

impl TrajectoryPoint {
    /// Risk clamped into `[0, 1]`. NaN maps to 0.
    #[must_use]
    pub fn clamped_risk(&self) -> f64 {
        if self.risk_level.is_nan() {
            0.0
        } else {
            self.risk_level.clamp(0.0, 1.0)
        }
    }
}

/// Holds the most recent [`TRAJECTORY_CAPACITY`] points, oldest first.
#[derive(Debug, Clone)]
pub struct TrajectoryTracker {
    points: BoundedBuffer<TrajectoryPoint>,
}

impl Default for TrajectoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TrajectoryTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            points: BoundedBuffer::new(TRAJECTORY_CAPACITY),
        }
    }

    /// Creates a tracker pre-filled with the seed path for `orbit`.
    ///
    /// The path walks the whole orbit once in [`TRAJECTORY_CAPACITY`] equal
    /// steps. Points with `x > center_x` and `y < center_y` get risk
    /// `0.8 + U(0, 0.1)`; all others `0.1 + U(0, 0.1)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rand::SeedableRng;
    /// use rand::rngs::StdRng;
    /// use robot_console::synth::Orbit;
    /// use robot_console::trajectory::TrajectoryTracker;
    ///
    /// let mut rng = StdRng::seed_from_u64(1);
    /// let tracker = TrajectoryTracker::seeded(&Orbit::default(), &mut rng);
    /// assert_eq!(tracker.len(), 100);
    /// ```
    pub fn seeded<R: Rng>(orbit: &Orbit, rng: &mut R) -> Self {
        let mut tracker = Self::new();
        for point in seed_path(orbit, rng) {
            tracker.points.push(point);
        }
        tracker
    }

    /// Appends a sample, evicting the oldest when full.
    pub fn append(&mut self, position: &Position, risk_level: f64, timestamp: Option<String>) {
        self.points.push(TrajectoryPoint {
            x: position.x,
            y: position.y,
            risk_level,
            timestamp,
        });
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TrajectoryPoint> + ExactSizeIterator {
        self.points.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TrajectoryPoint> {
        self.points.latest()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Owned copy of the points, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TrajectoryPoint> {
        self.points.to_vec()
    }
}

/// True inside the engineered high-risk quadrant of the seed path.
#[must_use]
pub fn in_high_risk_quadrant(orbit: &Orbit, x: f64, y: f64) -> bool {
    x > orbit.center_x && y < orbit.center_y
}

/// Generates the deterministic seed path with bounded random risk jitter.
pub fn seed_path<R: Rng>(orbit: &Orbit, rng: &mut R) -> Vec<TrajectoryPoint> {
    (0..TRAJECTORY_CAPACITY)
        .map(|i| {
            let angle = TAU * i as f64 / TRAJECTORY_CAPACITY as f64;
            let (x, y) = orbit.point_at(angle);
            let (x, y) = (round_to(x, 2), round_to(y, 2));
            let base = if in_high_risk_quadrant(orbit, x, y) {
                SEED_HIGH_RISK
            } else {
                SEED_LOW_RISK
            };
            TrajectoryPoint {
                x,
                y,
                risk_level: round_to(base + rng.random_range(0.0..SEED_JITTER), 3),
                timestamp: None,
            }
        })
        .collect()
}
