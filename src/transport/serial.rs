//! # Serial Link
//!
//! Line-oriented link to the robot over a USB serial port.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control), trying the usual
//!   device paths when the configured port is `auto`
//! - Splitting the incoming byte stream into newline-terminated payloads
//! - Writing outbound commands as one text line each (`FORWARD\n`)
//! - Reporting connect failures and auto-reverting to disconnected

use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot::error::TryRecvError;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::{
    Command, ConnectionState, EventSender, LinkControl, LinkHandle, LinkKind, LinkReporter,
};
use crate::config::SerialConfig;
use crate::error::{ConsoleError, Result};

/// Device paths tried, in order, when the configured port is `auto`.
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (most common on the robot)
    "/dev/ttyACM0", // USB CDC devices
];

/// Lines longer than this are discarded as line noise.
pub const MAX_LINE_LEN: usize = 4096;

/// Opened serial port plus the path it was found at.
pub struct RobotSerial {
    port: tokio_serial::SerialStream,
    device_path: String,
}

impl std::fmt::Debug for RobotSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl RobotSerial {
    /// Opens the port named in the config, or auto-detects it.
    ///
    /// # Errors
    ///
    /// Returns error if no candidate device can be opened
    pub fn open(config: &SerialConfig) -> Result<Self> {
        if config.port.is_empty() || config.port.eq_ignore_ascii_case("auto") {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, config.baud_rate)
        } else {
            Self::open_with_paths(&[config.port.as_str()], config.baud_rate)
        }
    }

    /// Tries each path in turn and keeps the first that opens.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::SerialPortNotFound`] listing every path tried
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened robot serial link at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(ConsoleError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| ConsoleError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

/// Starts the serial adapter task for connect attempt `epoch`.
///
/// A shutdown requested before the port is opened, or while the error
/// status is showing, ends the attempt at once. Must be called from within
/// a tokio runtime.
pub fn spawn(
    config: SerialConfig,
    epoch: u64,
    events: EventSender,
    error_revert: Duration,
) -> LinkHandle {
    let (handle, control) = LinkHandle::pair(LinkKind::Serial, epoch);
    let reporter = LinkReporter::new(LinkKind::Serial, epoch, events);

    tokio::spawn(async move {
        let LinkControl {
            commands,
            mut shutdown,
        } = control;

        // Ok or Closed: nobody wants this link any more
        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            debug!("Serial connect cancelled before opening");
            reporter.status(ConnectionState::Disconnected, None).await;
            return;
        }

        match RobotSerial::open(&config) {
            Ok(serial) => {
                let detail = format!("{} @ {} baud", serial.device_path(), config.baud_rate);
                reporter.status(ConnectionState::Connected, Some(detail)).await;
                let control = LinkControl { commands, shutdown };
                let reason = run_line_link(serial.port, &reporter, control).await;
                reporter.status(ConnectionState::Disconnected, reason).await;
            }
            Err(e) => {
                warn!("Serial connect failed: {}", e);
                reporter.status(ConnectionState::Error, Some(e.to_string())).await;
                tokio::select! {
                    _ = tokio::time::sleep(error_revert) => {}
                    _ = &mut shutdown => debug!("Serial error state cleared by disconnect"),
                }
                reporter.status(ConnectionState::Disconnected, None).await;
            }
        }
    });

    handle
}

/// Pumps one open line-oriented stream until shutdown, EOF, or an I/O error.
///
/// Returns a human-readable reason when the link ended for any cause other
/// than a requested shutdown. The stream is dropped before returning.
pub async fn run_line_link<S>(
    stream: S,
    reporter: &LinkReporter,
    control: LinkControl,
) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let LinkControl {
        mut commands,
        mut shutdown,
    } = control;
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buffer = BytesMut::with_capacity(1024);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Serial link shutdown requested");
                return None;
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    return None;
                };
                if let Err(e) = write_command(&mut writer, command).await {
                    return Some(format!("write failed: {}", e));
                }
            }

            read = reader.read_buf(&mut buffer) => {
                match read {
                    Ok(0) => return Some("link closed by peer".to_string()),
                    Ok(_) => {
                        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                            let line = buffer.split_to(end + 1);
                            let text = String::from_utf8_lossy(&line);
                            reporter.payload(&text).await;
                        }
                        if buffer.len() > MAX_LINE_LEN {
                            debug!("Discarding {} bytes without line terminator", buffer.len());
                            buffer.clear();
                        }
                    }
                    Err(e) => return Some(format!("read failed: {}", e)),
                }
            }
        }
    }
}

async fn write_command<W>(writer: &mut W, command: Command) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = format!("{}\n", command);
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| ConsoleError::Serial(format!("Failed to write command: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| ConsoleError::Serial(format!("Failed to flush serial port: {}", e)))?;

    debug!("Sent command {}", command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::record::Mode;
    use crate::transport::{event_channel, EventKind};
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};
    use tokio::time::timeout;

    fn fragment_methane(kind: &EventKind) -> Option<f64> {
        match kind {
            EventKind::Fragment(f) => f.methane,
            _ => None,
        }
    }

    #[test]
    fn test_default_device_paths() {
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 2);
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyUSB0");
        assert_eq!(DEFAULT_DEVICE_PATHS[1], "/dev/ttyACM0");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = RobotSerial::open_with_paths(invalid_paths, 115_200);

        match result.unwrap_err() {
            ConsoleError::SerialPortNotFound(msg) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = RobotSerial::open_port("/dev/nonexistent_serial_device_12345", 115_200);

        match result.unwrap_err() {
            ConsoleError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lines_become_fragments() {
        let (link_end, mut robot_end) = duplex(1024);
        let (tx, mut rx) = event_channel();
        let reporter = LinkReporter::new(LinkKind::Serial, 1, tx);
        let (_handle, control) = LinkHandle::pair(LinkKind::Serial, 1);

        let task = tokio::spawn(async move { run_line_link(link_end, &reporter, control).await });

        robot_end.write_all(b"m:0.41,b:90\nnoise\n").await.unwrap();
        // A payload split across two writes
        robot_end.write_all(b"{\"methane\": 0.").await.unwrap();
        robot_end.write_all(b"52}\n").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(fragment_methane(&first.kind), Some(0.41));
        let second = rx.recv().await.unwrap();
        assert_eq!(fragment_methane(&second.kind), Some(0.52));

        drop(robot_end);
        let reason = task.await.unwrap();
        assert_eq!(reason.as_deref(), Some("link closed by peer"));
    }

    #[tokio::test]
    async fn test_commands_written_as_lines() {
        let (link_end, robot_end) = duplex(1024);
        let (tx, _rx) = event_channel();
        let reporter = LinkReporter::new(LinkKind::Serial, 1, tx);
        let (mut handle, control) = LinkHandle::pair(LinkKind::Serial, 1);

        let task = tokio::spawn(async move { run_line_link(link_end, &reporter, control).await });

        handle.send(Command::Forward).unwrap();
        handle.send(Command::Mode(Mode::Flight)).unwrap();

        let mut lines = BufReader::new(robot_end).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("FORWARD"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("MODE:FLIGHT"));

        handle.request_shutdown();
        assert_eq!(task.await.unwrap(), None, "Requested shutdown reports no error");
    }

    #[tokio::test]
    async fn test_overlong_line_discarded() {
        let (link_end, mut robot_end) = duplex(16 * 1024);
        let (tx, mut rx) = event_channel();
        let reporter = LinkReporter::new(LinkKind::Serial, 1, tx);
        let (mut handle, control) = LinkHandle::pair(LinkKind::Serial, 1);

        let task = tokio::spawn(async move { run_line_link(link_end, &reporter, control).await });

        robot_end.write_all(&vec![b'x'; MAX_LINE_LEN + 100]).await.unwrap();
        robot_end.write_all(b"\nm:0.2\n").await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(fragment_methane(&event.kind), Some(0.2));

        handle.request_shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_reports_error_then_disconnected() {
        let (tx, mut rx) = event_channel();
        let config = SerialConfig {
            port: "/dev/nonexistent_serial_device_12345".to_string(),
            ..SerialConfig::default()
        };

        let handle = spawn(config, 4, tx, Duration::from_millis(10));
        assert_eq!(handle.epoch(), 4);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.epoch, 4);
        assert!(matches!(
            first.kind,
            EventKind::Status {
                state: ConnectionState::Error,
                detail: Some(_)
            }
        ));

        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.kind,
            EventKind::Status {
                state: ConnectionState::Disconnected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_before_open_skips_port() {
        let (tx, mut rx) = event_channel();
        let config = SerialConfig {
            port: "/dev/nonexistent_serial_device_12345".to_string(),
            ..SerialConfig::default()
        };

        // Current-thread runtime: the task has not run yet
        let mut handle = spawn(config, 5, tx, Duration::from_secs(60));
        assert!(handle.request_shutdown());

        let event = timeout(Duration::from_secs(3), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.epoch, 5);
        assert!(matches!(
            event.kind,
            EventKind::Status {
                state: ConnectionState::Disconnected,
                detail: None
            }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_clears_error_state() {
        let (tx, mut rx) = event_channel();
        let config = SerialConfig {
            port: "/dev/nonexistent_serial_device_12345".to_string(),
            ..SerialConfig::default()
        };

        let mut handle = spawn(config, 6, tx, Duration::from_secs(60));
        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.kind,
            EventKind::Status {
                state: ConnectionState::Error,
                ..
            }
        ));

        handle.request_shutdown();
        let second = timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Disconnect should not wait out the error revert delay")
            .unwrap();
        assert!(matches!(
            second.kind,
            EventKind::Status {
                state: ConnectionState::Disconnected,
                ..
            }
        ));
    }

    #[tokio::test]
    #[ignore] // Requires the robot on a serial port. Run with: cargo test -- --ignored
    async fn test_open_with_real_hardware() {
        match RobotSerial::open(&SerialConfig::default()) {
            Ok(serial) => println!("Opened robot link at: {}", serial.device_path()),
            Err(_) => println!("No robot serial device detected (this is OK for CI)"),
        }
    }
}
