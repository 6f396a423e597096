//! # Telemetry Reconciler
//!
//! Decides, once per tick, which source governs telemetry and keeps the
//! bounded history, the trajectory and the current position up to date.
//!
//! ## Authority
//!
//! - [`Authority::Synthetic`]: no link is connected. The synthesizer supplies
//!   the record and the position; the record goes into the history and its
//!   methane value becomes the trajectory risk.
//! - [`Authority::External`]: at least one link is connected. Fragments from
//!   the links are merged onto the latest record as they arrive. The
//!   position is still synthesized because the links carry no position
//!   channel.
//!
//! The reconciler is the only writer of the history, the trajectory and the
//! position. Adapters talk to it exclusively through [`TransportEvent`]s.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::session::Session;
use crate::synth::{Synthesizer, FLIGHT_ALTITUDE, TRACK_ALTITUDE};
use crate::telemetry::fragment::Fragment;
use crate::telemetry::history::History;
use crate::telemetry::record::{Mode, Position, TelemetryRecord};
use crate::trajectory::TrajectoryTracker;
use crate::transport::{EventKind, TransportEvent};
use crate::traversability::{evaluate, AlgorithmConfig};

/// Which source governs telemetry for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authority {
    #[default]
    Synthetic,
    External,
}

impl Authority {
    /// Derives the authority from the session's link states.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        if session.any_connected() {
            Authority::External
        } else {
            Authority::Synthetic
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authority::Synthetic => f.write_str("SYNTHETIC"),
            Authority::External => f.write_str("EXTERNAL"),
        }
    }
}

/// Source of display timestamps.
#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    /// Current time as a display string.
    fn stamp(&self) -> String;
}

/// Wall clock in local time, `HH:MM:SS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn stamp(&self) -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }
}

/// Owner of the history, trajectory and position.
#[derive(Debug)]
pub struct Reconciler<C: Clock = LocalClock> {
    synth: Synthesizer,
    history: History,
    trajectory: TrajectoryTracker,
    latest: Option<TelemetryRecord>,
    position: Position,
    authority: Authority,
    clock: C,
}

impl Reconciler<LocalClock> {
    /// Creates a reconciler on the wall clock.
    #[must_use]
    pub fn new(simulation: &SimulationConfig, mode: Mode) -> Self {
        Self::with_clock(simulation, mode, LocalClock)
    }
}

impl<C: Clock> Reconciler<C> {
    /// Creates a reconciler from the simulation settings.
    ///
    /// A non-zero seed makes the synthesized telemetry and the seeded
    /// trajectory reproducible; zero seeds both from OS entropy.
    pub fn with_clock(simulation: &SimulationConfig, mode: Mode, clock: C) -> Self {
        let orbit = simulation.orbit();
        let (synth, trajectory) = if simulation.seed == 0 {
            let mut rng = StdRng::from_os_rng();
            (
                Synthesizer::from_entropy(orbit),
                TrajectoryTracker::seeded(&orbit, &mut rng),
            )
        } else {
            // Separate streams so trajectory jitter doesn't shift the synthesized signals
            let mut rng = StdRng::seed_from_u64(simulation.seed.wrapping_add(1));
            (
                Synthesizer::with_seed(orbit, simulation.seed),
                TrajectoryTracker::seeded(&orbit, &mut rng),
            )
        };
        Self::from_parts(synth, trajectory, mode, clock)
    }

    /// Assembles a reconciler from prepared parts.
    ///
    /// The position starts at angle zero on the synthesizer's orbit.
    pub fn from_parts(synth: Synthesizer, trajectory: TrajectoryTracker, mode: Mode, clock: C) -> Self {
        let (x, y) = synth.orbit().point_at(0.0);
        let z = match mode {
            Mode::Flight => FLIGHT_ALTITUDE,
            Mode::Track => TRACK_ALTITUDE,
        };
        Self {
            synth,
            history: History::telemetry(),
            trajectory,
            latest: None,
            position: Position {
                x,
                y,
                z,
                heading: 90.0,
            },
            authority: Authority::Synthetic,
            clock,
        }
    }

    /// Runs one tick against the current session state.
    ///
    /// Returns the authority that governed the tick.
    pub fn tick(&mut self, session: &Session) -> Authority {
        let authority = Authority::from_session(session);
        if authority != self.authority {
            info!("Telemetry authority: {} -> {}", self.authority, authority);
            self.authority = authority;
        }

        let stamp = self.clock.stamp();
        let config = session.config();
        let (record, position) = self.synth.synthesize(session.mode(), &config, &stamp);
        self.position = position;

        match authority {
            Authority::Synthetic => {
                let risk = record.methane;
                self.history.push(record.clone());
                self.latest = Some(record);
                self.trajectory.append(&position, risk, Some(stamp));
            }
            Authority::External => {
                // Synthesized record is discarded; only the position is used
                let risk = self.latest.as_ref().map_or(0.0, |r| r.methane);
                self.trajectory.append(&position, risk, Some(stamp));
            }
        }

        debug!(
            "Tick {} ({}): history={} trajectory={}",
            self.synth.tick(),
            authority,
            self.history.len(),
            self.trajectory.len()
        );
        authority
    }

    /// Applies one event from a link adapter.
    ///
    /// Status events update the session. Fragments are merged only if they
    /// come from the current epoch of a connected link; everything else is
    /// discarded. Returns `true` if a record was appended to the history.
    pub fn handle_event(&mut self, session: &mut Session, event: TransportEvent) -> bool {
        let TransportEvent { link, epoch, kind } = event;
        match kind {
            EventKind::Status { state, detail } => {
                session.apply_status(link, epoch, state, detail);
                false
            }
            EventKind::Fragment(fragment) => {
                if !session.accepts_fragment(link, epoch) {
                    debug!("Discarding fragment from inactive {} link (epoch {})", link, epoch);
                    return false;
                }
                self.merge(&fragment, &session.config());
                true
            }
        }
    }

    /// Merges a fragment onto the latest record and appends the result.
    ///
    /// Fields the fragment lacks keep their prior value (zero before any
    /// record exists). A missing timestamp becomes the current time and a
    /// missing verdict is evaluated against `config`.
    pub fn merge(&mut self, fragment: &Fragment, config: &AlgorithmConfig) -> &TelemetryRecord {
        let prior = self
            .latest
            .take()
            .unwrap_or_else(|| TelemetryRecord::blank(String::new()));
        let mut record = fragment.apply_to(&prior);

        if fragment.timestamp.is_none() {
            record.timestamp = self.clock.stamp();
        }
        if fragment.traversable.is_none() {
            record.traversable =
                evaluate(record.slope, record.step_height, record.roughness, config);
        }

        self.history.push(record.clone());
        self.latest.insert(record)
    }

    /// Most recent complete record, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.latest.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn trajectory(&self) -> &TrajectoryTracker {
        &self.trajectory
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Authority of the last tick.
    #[must_use]
    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Number of ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.synth.tick()
    }
}
