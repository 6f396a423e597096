//! # Socket Link
//!
//! Message-oriented link to the robot over a WebSocket.
//!
//! Every text (or UTF-8 binary) message is one telemetry payload. Commands
//! go out as JSON messages of the form `{"command": "FORWARD"}`. Ping/pong
//! is answered by the WebSocket layer itself.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Command, ConnectionState, EventSender, LinkControl, LinkHandle, LinkKind, LinkReporter};
use crate::config::SocketConfig;
use crate::error::{ConsoleError, Result};

/// Encodes a command as a WebSocket message.
///
/// # Examples
///
/// ```
/// use robot_console::transport::Command;
/// use robot_console::transport::socket::encode_command;
///
/// let message = encode_command(Command::Stop);
/// assert_eq!(message.to_text().unwrap(), r#"{"command":"STOP"}"#);
/// ```
#[must_use]
pub fn encode_command(command: Command) -> Message {
    let body = serde_json::json!({ "command": command.to_string() });
    Message::text(body.to_string())
}

/// Starts the socket adapter task for connect attempt `epoch`.
///
/// The handshake races the shutdown signal and `config.connect_timeout`, so
/// a disconnect requested while connecting ends the attempt at once. Must
/// be called from within a tokio runtime.
pub fn spawn(
    config: SocketConfig,
    epoch: u64,
    events: EventSender,
    error_revert: Duration,
) -> LinkHandle {
    let (handle, control) = LinkHandle::pair(LinkKind::Socket, epoch);
    let reporter = LinkReporter::new(LinkKind::Socket, epoch, events);

    tokio::spawn(async move {
        let LinkControl {
            commands,
            mut shutdown,
        } = control;
        let connect = tokio::time::timeout(config.connect_timeout(), connect_async(config.url.as_str()));

        let outcome = tokio::select! {
            _ = &mut shutdown => {
                debug!("Socket connect to {} cancelled", config.url);
                reporter.status(ConnectionState::Disconnected, None).await;
                return;
            }
            outcome = connect => outcome,
        };

        let err = match outcome {
            Ok(Ok((ws, _response))) => {
                info!("Opened robot socket link at {}", config.url);
                reporter
                    .status(ConnectionState::Connected, Some(config.url.clone()))
                    .await;
                let control = LinkControl { commands, shutdown };
                let reason = run_message_link(ws, &reporter, control).await;
                reporter.status(ConnectionState::Disconnected, reason).await;
                return;
            }
            Ok(Err(e)) => ConsoleError::Socket(format!("Failed to connect to {}: {}", config.url, e)),
            Err(_) => ConsoleError::Socket(format!(
                "Handshake with {} timed out after {} ms",
                config.url, config.connect_timeout_ms
            )),
        };

        warn!("Socket connect failed: {}", err);
        reporter.status(ConnectionState::Error, Some(err.to_string())).await;
        tokio::select! {
            _ = tokio::time::sleep(error_revert) => {}
            _ = &mut shutdown => debug!("Socket error state cleared by disconnect"),
        }
        reporter.status(ConnectionState::Disconnected, None).await;
    });

    handle
}

/// Pumps one open WebSocket until shutdown, close, or an error.
///
/// Returns a human-readable reason when the link ended for any cause other
/// than a requested shutdown.
pub async fn run_message_link<S>(
    ws: WebSocketStream<S>,
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
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Socket link shutdown requested");
                let _ = sink.send(Message::Close(None)).await;
                return None;
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = sink.send(Message::Close(None)).await;
                    return None;
                };
                if let Err(e) = send_command(&mut sink, command).await {
                    return Some(e.to_string());
                }
            }

            message = stream.next() => {
                match message {
                    Some(Ok(message)) if message.is_text() || message.is_binary() => {
                        match message.to_text() {
                            Ok(text) => reporter.payload(text).await,
                            Err(e) => debug!("Dropping non UTF-8 socket message: {}", e),
                        }
                    }
                    Some(Ok(message)) if message.is_close() => {
                        return Some("link closed by peer".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Some(format!("socket error: {}", e)),
                    None => return Some("link closed by peer".to_string()),
                }
            }
        }
    }
}

async fn send_command<K>(sink: &mut K, command: Command) -> Result<()>
where
    K: futures_util::Sink<Message> + Unpin,
    K::Error: std::fmt::Display,
{
    sink.send(encode_command(command))
        .await
        .map_err(|e| ConsoleError::Socket(format!("Failed to send command: {}", e)))?;
    debug!("Sent command {}", command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{event_channel, EventKind, TransportEvent};
    use tokio::io::duplex;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(8 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    #[test]
    fn test_encode_command() {
        let message = encode_command(Command::Engine(true));
        assert!(message.is_text());
        let json: serde_json::Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        assert_eq!(json["command"], "ENGINE:ON");
    }

    #[tokio::test]
    async fn test_messages_become_fragments() {
        let (client, mut robot) = ws_pair().await;
        let (tx, mut rx) = event_channel();
        let reporter = LinkReporter::new(LinkKind::Socket, 2, tx);
        let (_handle, control) = LinkHandle::pair(LinkKind::Socket, 2);

        let task = tokio::spawn(async move { run_message_link(client, &reporter, control).await });

        robot.send(Message::text("not telemetry")).await.unwrap();
        robot.send(Message::text(r#"{"m": 0.61, "rssi": 70}"#)).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.link, LinkKind::Socket);
        assert_eq!(event.epoch, 2);
        match event.kind {
            EventKind::Fragment(f) => {
                assert_eq!(f.methane, Some(0.61));
                assert_eq!(f.wifi_signal, Some(70.0));
            }
            other => panic!("Expected fragment, got {:?}", other),
        }

        robot.close(None).await.unwrap();
        let reason = task.await.unwrap();
        assert!(reason.is_some());
    }

    #[tokio::test]
    async fn test_commands_sent_as_json() {
        let (client, mut robot) = ws_pair().await;
        let (tx, _rx) = event_channel();
        let reporter = LinkReporter::new(LinkKind::Socket, 1, tx);
        let (mut handle, control) = LinkHandle::pair(LinkKind::Socket, 1);

        let task = tokio::spawn(async move { run_message_link(client, &reporter, control).await });

        handle.send(Command::Left).unwrap();
        let message = robot.next().await.unwrap().unwrap();
        assert_eq!(message.to_text().unwrap(), r#"{"command":"LEFT"}"#);

        handle.request_shutdown();
        assert_eq!(task.await.unwrap(), None);
    }

    /// Accepts TCP connections and never answers the upgrade request.
    async fn silent_peer() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        format!("ws://{}/telemetry", addr)
    }

    fn expect_state(event: &TransportEvent, expected: ConnectionState) {
        match &event.kind {
            EventKind::Status { state, .. } => assert_eq!(*state, expected),
            other => panic!("Expected {} status, got {:?}", expected, other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_during_handshake() {
        let (tx, mut rx) = event_channel();
        let config = SocketConfig {
            url: silent_peer().await,
            connect_timeout_ms: 60_000,
            ..SocketConfig::default()
        };

        let mut handle = spawn(config, 3, tx, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err(), "Handshake should still be pending");

        assert!(handle.request_shutdown());
        let event = timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Adapter should stop connecting once shutdown is requested")
            .unwrap();
        assert_eq!(event.epoch, 3);
        expect_state(&event, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_handshake_timeout_reports_error() {
        let (tx, mut rx) = event_channel();
        let config = SocketConfig {
            url: silent_peer().await,
            connect_timeout_ms: 50,
            ..SocketConfig::default()
        };

        let _handle = spawn(config, 1, tx, Duration::from_millis(10));

        let first = timeout(Duration::from_secs(3), rx.recv()).await.unwrap().unwrap();
        match &first.kind {
            EventKind::Status {
                state: ConnectionState::Error,
                detail: Some(detail),
            } => assert!(detail.contains("timed out")),
            other => panic!("Expected error status, got {:?}", other),
        }
        let second = timeout(Duration::from_secs(3), rx.recv()).await.unwrap().unwrap();
        expect_state(&second, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_clears_error_state() {
        let (tx, mut rx) = event_channel();
        let config = SocketConfig {
            url: "ws://127.0.0.1:1/telemetry".to_string(),
            ..SocketConfig::default()
        };

        let mut handle = spawn(config, 2, tx, Duration::from_secs(60));
        let first = rx.recv().await.unwrap();
        expect_state(&first, ConnectionState::Error);

        handle.request_shutdown();
        let second = timeout(Duration::from_secs(3), rx.recv()).await.unwrap().unwrap();
        expect_state(&second, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_spawn_reports_error_then_disconnected() {
        let (tx, mut rx) = event_channel();
        // Nothing listens on port 1
        let config = SocketConfig {
            url: "ws://127.0.0.1:1/telemetry".to_string(),
            ..SocketConfig::default()
        };

        let _handle = spawn(config, 9, tx, Duration::from_millis(10));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.epoch, 9);
        assert!(matches!(
            first.kind,
            EventKind::Status {
                state: ConnectionState::Error,
                ..
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
}
