//! # Error Types
//!
//! Custom error types for the robot console using `thiserror`.

use thiserror::Error;

use crate::transport::LinkKind;

/// Main error type for the robot console
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Configuration file errors (parse failures and validation messages)
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Decision threshold outside its documented range
    #[error("Invalid threshold: {name} = {value} (allowed {min}..={max})")]
    InvalidThreshold {
        /// Threshold field name
        name: &'static str,
        /// Rejected value
        value: f64,
        /// Inclusive lower bound
        min: f64,
        /// Inclusive upper bound
        max: f64,
    },

    /// Operator command that is not part of the command vocabulary
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Transport payload that could not be turned into a telemetry fragment
    #[error("Malformed telemetry fragment: {0}")]
    MalformedFragment(String),

    /// Serial link errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// WebSocket link errors
    #[error("Socket error: {0}")]
    Socket(String),

    /// The adapter task behind a link is gone
    #[error("{0} link is closed")]
    LinkClosed(LinkKind),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the robot console
pub type Result<T> = std::result::Result<T, ConsoleError>;
