//! # Telemetry Module
//!
//! Telemetry data model shared by every other module.
//!
//! This module handles:
//! - Complete telemetry records, positions, and the locomotion mode
//! - Partial fragments from the transport links and their merge policy
//! - The bounded recent-history buffer

pub mod fragment;
pub mod history;
pub mod record;

pub use fragment::{Field, Fragment};
pub use history::{BoundedBuffer, History, HISTORY_CAPACITY};
pub use record::{Mode, Position, TelemetryRecord};
