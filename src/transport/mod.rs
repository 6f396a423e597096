//! # Transport Module
//!
//! Boundary between the console core and the two robot links.
//!
//! This module handles:
//! - The outbound command vocabulary and its text encoding
//! - The inbound event stream (connection status changes and telemetry
//!   fragments), tagged with the link and connection epoch that produced it
//! - Handles used by the session to send commands and stop a link
//!
//! Each adapter runs as its own tokio task. It never touches the history:
//! everything it learns flows through one [`mpsc`] channel of
//! [`TransportEvent`]s that the reconciler drains.
//!
//! ## Epochs
//!
//! Every connect attempt gets a fresh epoch number from the session. Events
//! carry the epoch of the attempt that produced them, so anything still in
//! flight from a link the operator already disconnected is recognisably
//! stale and gets discarded.

use std::fmt;
use std::str::FromStr;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{ConsoleError, Result};
use crate::telemetry::fragment::Fragment;
use crate::telemetry::record::Mode;

pub mod serial;
pub mod socket;

/// Capacity of the shared transport event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Which physical link an event or handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Line-oriented serial link
    Serial,
    /// Message-oriented WebSocket link
    Socket,
}

impl LinkKind {
    /// Both links, in display order.
    pub const ALL: [LinkKind; 2] = [LinkKind::Serial, LinkKind::Socket];
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Serial => f.write_str("serial"),
            LinkKind::Socket => f.write_str("socket"),
        }
    }
}

impl FromStr for LinkKind {
    type Err = ConsoleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" | "usb" => Ok(LinkKind::Serial),
            "socket" | "ws" | "websocket" => Ok(LinkKind::Socket),
            other => Err(ConsoleError::InvalidCommand(format!("unknown link '{}'", other))),
        }
    }
}

/// Connection status of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Connect attempt failed; reverts to `Disconnected` after a short delay
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(text)
    }
}

/// Outbound operator command.
///
/// Encoded as short text tokens: `FORWARD`, `BACKWARD`, `LEFT`, `RIGHT`,
/// `STOP`, `UP`, `DOWN`, `MODE:FLIGHT`, `MODE:TRACK`, `ENGINE:ON`,
/// `ENGINE:OFF`. How a token is framed on the wire is up to each adapter.
///
/// # Examples
///
/// ```
/// use robot_console::transport::Command;
/// use robot_console::telemetry::record::Mode;
///
/// assert_eq!(Command::Mode(Mode::Flight).to_string(), "MODE:FLIGHT");
/// assert_eq!("engine:on".parse::<Command>().unwrap(), Command::Engine(true));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    Up,
    Down,
    /// Switch locomotion mode
    Mode(Mode),
    /// Turn the engine on (`true`) or off
    Engine(bool),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Forward => f.write_str("FORWARD"),
            Command::Backward => f.write_str("BACKWARD"),
            Command::Left => f.write_str("LEFT"),
            Command::Right => f.write_str("RIGHT"),
            Command::Stop => f.write_str("STOP"),
            Command::Up => f.write_str("UP"),
            Command::Down => f.write_str("DOWN"),
            Command::Mode(mode) => write!(f, "MODE:{}", mode),
            Command::Engine(on) => write!(f, "ENGINE:{}", if *on { "ON" } else { "OFF" }),
        }
    }
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let token = s.trim().to_ascii_uppercase();
        let command = match token.as_str() {
            "FORWARD" => Command::Forward,
            "BACKWARD" => Command::Backward,
            "LEFT" => Command::Left,
            "RIGHT" => Command::Right,
            "STOP" => Command::Stop,
            "UP" => Command::Up,
            "DOWN" => Command::Down,
            "ENGINE:ON" => Command::Engine(true),
            "ENGINE:OFF" => Command::Engine(false),
            other => match other.strip_prefix("MODE:") {
                Some(mode) => Command::Mode(mode.parse()?),
                None => return Err(ConsoleError::InvalidCommand(s.trim().to_string())),
            },
        };
        Ok(command)
    }
}

/// What happened on a link.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Connection status transition, with an optional diagnostic line
    Status {
        state: ConnectionState,
        detail: Option<String>,
    },
    /// A parsed telemetry fragment
    Fragment(Fragment),
}

/// Event emitted by an adapter task.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub link: LinkKind,
    pub epoch: u64,
    pub kind: EventKind,
}

/// Sending half of the shared transport event channel.
pub type EventSender = mpsc::Sender<TransportEvent>;
/// Receiving half of the shared transport event channel.
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Creates the channel every adapter reports into.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Adapter-side helper that tags events with the link and epoch.
#[derive(Debug, Clone)]
pub struct LinkReporter {
    link: LinkKind,
    epoch: u64,
    events: EventSender,
}

impl LinkReporter {
    pub fn new(link: LinkKind, epoch: u64, events: EventSender) -> Self {
        Self { link, epoch, events }
    }

    /// Reports a status transition.
    pub async fn status(&self, state: ConnectionState, detail: Option<String>) {
        self.emit(EventKind::Status { state, detail }).await;
    }

    /// Parses a payload and forwards it if it is telemetry.
    ///
    /// Malformed payloads are dropped here; the core never sees them.
    pub async fn payload(&self, payload: &str) {
        match Fragment::parse(payload) {
            Ok(fragment) => self.emit(EventKind::Fragment(fragment)).await,
            Err(e) => debug!("{} link: dropping payload {:?}: {}", self.link, payload.trim(), e),
        }
    }

    async fn emit(&self, kind: EventKind) {
        let event = TransportEvent {
            link: self.link,
            epoch: self.epoch,
            kind,
        };
        // Receiver gone means the console is shutting down
        if self.events.send(event).await.is_err() {
            debug!("{} link: event channel closed", self.link);
        }
    }
}

/// Adapter-side ends of a link's control channels.
#[derive(Debug)]
pub struct LinkControl {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub shutdown: oneshot::Receiver<()>,
}

/// Session-side handle to a running adapter task.
#[derive(Debug)]
pub struct LinkHandle {
    link: LinkKind,
    epoch: u64,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl LinkHandle {
    /// Creates a handle together with the adapter-side control ends.
    #[must_use]
    pub fn pair(link: LinkKind, epoch: u64) -> (Self, LinkControl) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            Self {
                link,
                epoch,
                commands: command_tx,
                shutdown: Some(shutdown_tx),
            },
            LinkControl {
                commands: command_rx,
                shutdown: shutdown_rx,
            },
        )
    }

    #[must_use]
    pub fn link(&self) -> LinkKind {
        self.link
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queues a command for the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::LinkClosed`] if the adapter task has exited.
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ConsoleError::LinkClosed(self.link))
    }

    /// Asks the adapter to close its connection. Non-blocking; the adapter
    /// reports `Disconnected` once its resources are released.
    ///
    /// Returns `false` if shutdown was already requested.
    pub fn request_shutdown(&mut self) -> bool {
        match self.shutdown.take() {
            Some(tx) => {
                // Err means the task already exited, which is the goal anyway
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tokens() {
        let cases = [
            (Command::Forward, "FORWARD"),
            (Command::Backward, "BACKWARD"),
            (Command::Left, "LEFT"),
            (Command::Right, "RIGHT"),
            (Command::Stop, "STOP"),
            (Command::Up, "UP"),
            (Command::Down, "DOWN"),
            (Command::Mode(Mode::Flight), "MODE:FLIGHT"),
            (Command::Mode(Mode::Track), "MODE:TRACK"),
            (Command::Engine(true), "ENGINE:ON"),
            (Command::Engine(false), "ENGINE:OFF"),
        ];
        for (command, token) in cases {
            assert_eq!(command.to_string(), token);
            assert_eq!(token.parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn test_command_parse_case_insensitive() {
        assert_eq!(" forward ".parse::<Command>().unwrap(), Command::Forward);
        assert_eq!("mode:flight".parse::<Command>().unwrap(), Command::Mode(Mode::Flight));
    }

    #[test]
    fn test_command_parse_rejects_unknown() {
        assert!(matches!("JUMP".parse::<Command>(), Err(ConsoleError::InvalidCommand(_))));
        assert!("MODE:SWIM".parse::<Command>().is_err());
        assert!("ENGINE:MAYBE".parse::<Command>().is_err());
    }

    #[test]
    fn test_link_kind_parse() {
        assert_eq!("serial".parse::<LinkKind>().unwrap(), LinkKind::Serial);
        assert_eq!("WS".parse::<LinkKind>().unwrap(), LinkKind::Socket);
        assert!("bluetooth".parse::<LinkKind>().is_err());
    }

    #[test]
    fn test_handle_send_and_shutdown() {
        let (mut handle, mut control) = LinkHandle::pair(LinkKind::Serial, 3);
        assert_eq!(handle.epoch(), 3);

        tokio_test::assert_ok!(handle.send(Command::Stop));
        assert_eq!(control.commands.try_recv().unwrap(), Command::Stop);

        assert!(handle.request_shutdown());
        assert!(!handle.request_shutdown(), "Second request should be a no-op");
        assert!(control.shutdown.try_recv().is_ok());
    }

    #[test]
    fn test_handle_send_after_adapter_exit() {
        let (handle, control) = LinkHandle::pair(LinkKind::Socket, 1);
        drop(control);
        let err = tokio_test::assert_err!(handle.send(Command::Up));
        assert!(matches!(err, ConsoleError::LinkClosed(LinkKind::Socket)));
    }

    #[tokio::test]
    async fn test_reporter_drops_malformed_payloads() {
        let (tx, mut rx) = event_channel();
        let reporter = LinkReporter::new(LinkKind::Serial, 7, tx);

        reporter.payload("garbage").await;
        reporter.payload("b:50").await;
        reporter.payload("m:0.3").await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.link, LinkKind::Serial);
        assert_eq!(event.epoch, 7);
        match event.kind {
            EventKind::Fragment(f) => assert_eq!(f.methane, Some(0.3)),
            other => panic!("Expected fragment, got {:?}", other),
        }
        assert!(rx.try_recv().is_err(), "Malformed payloads must not be forwarded");
    }
}
