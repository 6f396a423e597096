//! # Robot Console Library
//!
//! Telemetry core for the operator console of a two-mode (flight/track)
//! inspection robot.
//!
//! This library decides each tick whether synthesized or link-supplied
//! telemetry governs, merges partial records from the serial and socket
//! links into a bounded history, evaluates terrain traversability against
//! operator thresholds, and keeps a risk-annotated trajectory for mapping.

pub mod config;
pub mod error;
pub mod reconciler;
pub mod session;
pub mod synth;
pub mod telemetry;
pub mod trajectory;
pub mod transport;
pub mod traversability;
