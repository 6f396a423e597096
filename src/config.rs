//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [serial]
//! port = "auto"
//! baud_rate = 115200
//!
//! [socket]
//! url = "ws://127.0.0.1:8765/telemetry"
//!
//! [thresholds]
//! max_slope = 35.0
//! max_step_height = 0.32
//! max_roughness = 0.05
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConsoleError, Result};
use crate::synth::Orbit;
use crate::telemetry::record::Mode;
use crate::traversability::AlgorithmConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub thresholds: AlgorithmConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path, or `auto` to try the usual paths
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Connect at startup
    #[serde(default)]
    pub auto_connect: bool,
}

/// WebSocket link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SocketConfig {
    #[serde(default = "default_socket_url")]
    pub url: String,

    /// Give up on a handshake that takes longer than this
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Connect at startup
    #[serde(default)]
    pub auto_connect: bool,
}

/// Session timing and startup state
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How long a failed link shows its error before reverting
    #[serde(default = "default_error_revert_ms")]
    pub error_revert_ms: u64,

    #[serde(default)]
    pub initial_mode: Mode,
}

/// Telemetry synthesizer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    /// RNG seed; 0 seeds from OS entropy
    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_orbit_center")]
    pub orbit_center_x: f64,

    #[serde(default = "default_orbit_center")]
    pub orbit_center_y: f64,

    #[serde(default = "default_orbit_radius")]
    pub orbit_radius: f64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "auto".to_string() }
fn default_baud_rate() -> u32 { 115200 }

fn default_socket_url() -> String { "ws://127.0.0.1:8765/telemetry".to_string() }
fn default_connect_timeout_ms() -> u64 { 5000 }

fn default_tick_interval_ms() -> u64 { 1000 }
fn default_error_revert_ms() -> u64 { 3000 }

fn default_orbit_center() -> f64 { 50.0 }
fn default_orbit_radius() -> f64 { 30.0 }

fn default_log_level() -> String { "info".to_string() }

/// Baud rates the robot firmware supports.
const SUPPORTED_BAUD_RATES: [u32; 6] = [9600, 19200, 38400, 57600, 115200, 230400];

/// Accepted values for `logging.level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            auto_connect: false,
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: default_socket_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            auto_connect: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            error_revert_ms: default_error_revert_ms(),
            initial_mode: Mode::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            orbit_center_x: default_orbit_center(),
            orbit_center_y: default_orbit_center(),
            orbit_radius: default_orbit_radius(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl SocketConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn error_revert(&self) -> Duration {
        Duration::from_millis(self.error_revert_ms)
    }
}

impl SimulationConfig {
    /// Orbit the synthesizer and the seed trajectory follow.
    pub fn orbit(&self) -> Orbit {
        Orbit {
            center_x: self.orbit_center_x,
            center_y: self.orbit_center_y,
            radius: self.orbit_radius,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use robot_console::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read, parsed, or
    /// validated
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "serial port cannot be empty (use \"auto\" to auto-detect)",
            )));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400",
            )));
        }

        if !(self.socket.url.starts_with("ws://") || self.socket.url.starts_with("wss://")) {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "socket url must start with ws:// or wss://",
            )));
        }

        if self.socket.connect_timeout_ms == 0 || self.socket.connect_timeout_ms > 60000 {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "connect_timeout_ms must be between 1 and 60000",
            )));
        }

        if self.session.tick_interval_ms < 100 || self.session.tick_interval_ms > 10000 {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "tick_interval_ms must be between 100 and 10000",
            )));
        }

        if self.session.error_revert_ms == 0 || self.session.error_revert_ms > 60000 {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "error_revert_ms must be between 1 and 60000",
            )));
        }

        self.thresholds.validate()?;

        if !(self.simulation.orbit_radius.is_finite() && self.simulation.orbit_radius > 0.0) {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "orbit_radius must be greater than 0",
            )));
        }

        if !self.simulation.orbit_center_x.is_finite() || !self.simulation.orbit_center_y.is_finite() {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "orbit center must be a finite coordinate",
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConsoleError::Config(toml::de::Error::custom(format!(
                "logging level '{}' must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ))));
        }

        if matches!(&self.logging.log_dir, Some(dir) if dir.is_empty()) {
            return Err(ConsoleError::Config(toml::de::Error::custom(
                "log_dir cannot be empty when set",
            )));
        }

        Ok(())
    }
}
