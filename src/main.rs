//! # Robot Console
//!
//! Operator console for a two-mode inspection robot.
//!
//! Runs the telemetry core at a fixed tick rate. With no link connected it
//! synthesizes telemetry; once the serial or socket link is up it relays
//! what the robot reports. Operator input is read line by line from stdin.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use robot_console::config::{Config, LoggingConfig};
use robot_console::error::ConsoleError;
use robot_console::reconciler::{Authority, Reconciler};
use robot_console::session::Session;
use robot_console::transport::{self, serial, socket, Command, EventSender, LinkKind};
use robot_console::traversability::{assess, AlgorithmConfig};

/// Config file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// How long shutdown waits for links to confirm they have closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
enum OperatorInput {
    /// Movement, mode or engine command
    Command(Command),
    Connect(LinkKind),
    Disconnect(LinkKind),
    /// Replace all three thresholds
    Thresholds(AlgorithmConfig),
    /// Print link states and thresholds
    Status,
    Quit,
}

/// Parses one stdin line. Blank lines yield `None`.
///
/// Accepted forms:
/// - `FORWARD`, `STOP`, `MODE:FLIGHT`, `ENGINE:ON`, ... (case-insensitive)
/// - `connect serial|socket`, `disconnect serial|socket`
/// - `thresholds <max_slope> <max_step_height> <max_roughness>`
/// - `status`, `quit`
fn parse_operator_line(line: &str) -> robot_console::error::Result<Option<OperatorInput>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((first, rest)) = words.split_first() else {
        return Ok(None);
    };

    let input = match (first.to_ascii_lowercase().as_str(), rest) {
        ("connect", [link]) => OperatorInput::Connect(link.parse()?),
        ("disconnect", [link]) => OperatorInput::Disconnect(link.parse()?),
        ("thresholds", [slope, step, rough]) => {
            let value = |text: &str| {
                text.parse::<f64>()
                    .map_err(|_| ConsoleError::InvalidCommand(format!("'{}' is not a number", text)))
            };
            OperatorInput::Thresholds(AlgorithmConfig::new(value(*slope)?, value(*step)?, value(*rough)?)?)
        }
        ("status", []) => OperatorInput::Status,
        ("quit" | "exit", []) => OperatorInput::Quit,
        (_, []) => OperatorInput::Command(first.parse()?),
        _ => return Err(ConsoleError::InvalidCommand(line.trim().to_string())),
    };
    Ok(Some(input))
}

/// Sets up the fmt subscriber, plus a daily log file when configured.
///
/// `RUST_LOG` overrides the configured level. The returned guard must stay
/// alive for the file writer to flush.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "robot-console.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Starts the adapter for `link` unless it is already active.
fn connect_link(session: &mut Session, config: &Config, link: LinkKind, events: &EventSender) {
    let Some(epoch) = session.begin_connect(link) else {
        return;
    };
    info!("Connecting {} link (epoch {})", link, epoch);

    let revert = config.session.error_revert();
    let handle = match link {
        LinkKind::Serial => serial::spawn(config.serial.clone(), epoch, events.clone(), revert),
        LinkKind::Socket => socket::spawn(config.socket.clone(), epoch, events.clone(), revert),
    };
    session.attach(handle);
}

fn log_status(reconciler: &Reconciler, session: &Session, authority: Authority) {
    let position = reconciler.position();
    let Some(record) = reconciler.latest() else {
        info!(
            "{} mode={} awaiting telemetry pos=({:.1}, {:.1})",
            authority,
            session.mode(),
            position.x,
            position.y
        );
        return;
    };

    info!(
        "[{}] {} mode={} CH4={:.3} battery={:.1}% traversable={} pos=({:.1}, {:.1}, {:.1}) heading={:.1}",
        record.timestamp,
        authority,
        session.mode(),
        record.methane,
        record.battery,
        record.traversable,
        position.x,
        position.y,
        position.z,
        position.heading
    );

    let thresholds = session.config();
    let report = assess(record.slope, record.step_height, record.roughness, &thresholds);
    let (axis, margin) = report.tightest_axis(&thresholds);
    debug!("Tightest axis: {} ({:+.0}% of limit)", axis, margin * 100.0);
}

fn apply_input(session: &mut Session, config: &Config, events: &EventSender, input: OperatorInput) {
    match input {
        OperatorInput::Command(Command::Mode(mode)) => {
            session.set_mode(mode);
        }
        OperatorInput::Command(command) => {
            session.issue_command(command);
        }
        OperatorInput::Connect(link) => connect_link(session, config, link, events),
        OperatorInput::Disconnect(link) => {
            if !session.request_disconnect(link) {
                info!("{} link is not active", link);
            }
        }
        OperatorInput::Thresholds(thresholds) => {
            if let Err(e) = session.set_config(thresholds) {
                warn!("Thresholds rejected: {}", e);
            }
        }
        OperatorInput::Status => {
            for link in LinkKind::ALL {
                let slot = session.link(link);
                info!(
                    "{} link: {} (epoch {}) {}",
                    link,
                    slot.state(),
                    slot.epoch(),
                    slot.detail().unwrap_or("")
                );
            }
            let thresholds = session.config();
            info!(
                "Mode {} thresholds: max_slope={} max_step_height={} max_roughness={}",
                session.mode(),
                thresholds.max_slope,
                thresholds.max_step_height,
                thresholds.max_roughness
            );
        }
        OperatorInput::Quit => {}
    }
}

/// Main entry point for the robot console
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging
///    - Seed the trajectory and open any auto-connect links
///
/// 2. **Main Loop**
///    - Run one reconciler tick per interval and log a status line
///    - Apply link events (status changes and fragments) as they arrive
///    - Apply operator input from stdin
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Ask every link to disconnect
///    - Wait briefly for the adapters to confirm
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);
    info!("Robot Console v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let mut session = Session::new(config.thresholds, config.session.initial_mode);
    let mut reconciler = Reconciler::new(&config.simulation, config.session.initial_mode);
    let (events_tx, mut events_rx) = transport::event_channel();

    if config.serial.auto_connect {
        connect_link(&mut session, &config, LinkKind::Serial, &events_tx);
    }
    if config.socket.auto_connect {
        connect_link(&mut session, &config, LinkKind::Socket, &events_tx);
    }

    let mut ticker = interval(config.session.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!(
        "Ticking every {} ms. Type commands (e.g. 'connect serial', 'FORWARD', 'status'), Ctrl+C to exit",
        config.session.tick_interval_ms
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let authority = reconciler.tick(&session);
                log_status(&reconciler, &session, authority);
            }

            Some(event) = events_rx.recv() => {
                reconciler.handle_event(&mut session, event);
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_operator_line(&line) {
                        Ok(Some(OperatorInput::Quit)) => {
                            info!("Quit requested, shutting down...");
                            break;
                        }
                        Ok(Some(input)) => apply_input(&mut session, &config, &events_tx, input),
                        Ok(None) => {}
                        Err(e) => warn!("Ignoring input: {}", e),
                    },
                    Ok(None) => {
                        debug!("stdin closed, operator input disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.disconnect_all();
    let grace = sleep(SHUTDOWN_GRACE);
    tokio::pin!(grace);
    while LinkKind::ALL.iter().any(|link| session.link(*link).is_busy()) {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                reconciler.handle_event(&mut session, event);
            }
            _ = &mut grace => {
                warn!("Links did not confirm shutdown in time");
                break;
            }
        }
    }

    info!(
        "Ran {} ticks, {} records in history",
        reconciler.ticks(),
        reconciler.history().len()
    );
    Ok(())
}
