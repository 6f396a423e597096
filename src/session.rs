//! # Session State
//!
//! The operator-facing state of one console session: the active decision
//! thresholds, the locomotion mode, and the status of both links.
//!
//! A [`Session`] is an ordinary owned value passed by reference to whoever
//! needs it; there is no process-wide state. Writers replace the threshold
//! configuration and the mode as whole values, so a tick never sees a
//! half-updated configuration.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::telemetry::record::Mode;
use crate::transport::{Command, ConnectionState, LinkHandle, LinkKind};
use crate::traversability::AlgorithmConfig;

/// Session-side bookkeeping for one link.
#[derive(Debug, Default)]
pub struct LinkSlot {
    state: ConnectionState,
    detail: Option<String>,
    /// Epoch of the current (or last) connect attempt
    epoch: u64,
    /// Disconnect requested; adapter has not confirmed yet
    closing: bool,
    handle: Option<LinkHandle>,
}

impl LinkSlot {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Diagnostic line from the last status change, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Connected and not on its way out.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && !self.closing
    }

    /// A connect attempt or live connection is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.handle.is_some()
    }
}

/// Owned state for one console session.
#[derive(Debug)]
pub struct Session {
    config: AlgorithmConfig,
    mode: Mode,
    serial: LinkSlot,
    socket: LinkSlot,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(AlgorithmConfig::default(), Mode::default())
    }
}

impl Session {
    /// Creates a session with both links disconnected.
    #[must_use]
    pub fn new(config: AlgorithmConfig, mode: Mode) -> Self {
        Self {
            config,
            mode,
            serial: LinkSlot::default(),
            socket: LinkSlot::default(),
        }
    }

    /// Active threshold configuration (a copy, never a live reference).
    #[must_use]
    pub fn config(&self) -> AlgorithmConfig {
        self.config
    }

    /// Replaces the threshold configuration as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::InvalidThreshold`](crate::error::ConsoleError::InvalidThreshold)
    /// if any value is out of range; the previous configuration stays active.
    pub fn set_config(&mut self, config: AlgorithmConfig) -> Result<()> {
        config.validate()?;
        info!(
            "Thresholds updated: max_slope={} max_step_height={} max_roughness={}",
            config.max_slope, config.max_step_height, config.max_roughness
        );
        self.config = config;
        Ok(())
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches locomotion mode and tells every connected link.
    ///
    /// Returns the number of links the `MODE:` command reached.
    pub fn set_mode(&mut self, mode: Mode) -> usize {
        info!("Mode set to {}", mode);
        self.mode = mode;
        self.issue_command(Command::Mode(mode))
    }

    /// Sends `command` to every connected link.
    ///
    /// With nothing connected this is a no-op that returns 0.
    pub fn issue_command(&self, command: Command) -> usize {
        let mut delivered = 0;
        for slot in [&self.serial, &self.socket] {
            if !slot.is_connected() {
                continue;
            }
            let Some(handle) = &slot.handle else {
                continue;
            };
            match handle.send(command) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Command {} not delivered: {}", command, e),
            }
        }
        if delivered == 0 {
            debug!("Command {} dropped: no connected link", command);
        }
        delivered
    }

    #[must_use]
    pub fn link(&self, link: LinkKind) -> &LinkSlot {
        match link {
            LinkKind::Serial => &self.serial,
            LinkKind::Socket => &self.socket,
        }
    }

    fn link_mut(&mut self, link: LinkKind) -> &mut LinkSlot {
        match link {
            LinkKind::Serial => &mut self.serial,
            LinkKind::Socket => &mut self.socket,
        }
    }

    /// True if at least one link is connected.
    #[must_use]
    pub fn any_connected(&self) -> bool {
        self.serial.is_connected() || self.socket.is_connected()
    }

    /// Reserves a new epoch for a connect attempt on `link`.
    ///
    /// Returns `None` if the link already has an attempt or connection in
    /// progress. The slot moves to `Connecting`.
    pub fn begin_connect(&mut self, link: LinkKind) -> Option<u64> {
        let slot = self.link_mut(link);
        if slot.is_busy() {
            warn!("{} link is already active", link);
            return None;
        }
        slot.epoch += 1;
        slot.state = ConnectionState::Connecting;
        slot.detail = None;
        slot.closing = false;
        Some(slot.epoch)
    }

    /// Stores the handle of the adapter started for the current epoch.
    ///
    /// A handle for any other epoch is stopped and discarded.
    pub fn attach(&mut self, mut handle: LinkHandle) {
        let link = handle.link();
        let slot = self.link_mut(link);
        if handle.epoch() != slot.epoch || slot.is_busy() {
            warn!("Discarding stale {} link handle (epoch {})", link, handle.epoch());
            handle.request_shutdown();
            return;
        }
        slot.handle = Some(handle);
    }

    /// Asks the adapter on `link` to disconnect.
    ///
    /// From this point the link no longer counts as connected and its
    /// fragments are discarded; the slot reads `Disconnected` once the
    /// adapter confirms it has released the connection.
    ///
    /// Returns `false` if there was nothing to disconnect.
    pub fn request_disconnect(&mut self, link: LinkKind) -> bool {
        let slot = self.link_mut(link);
        match slot.handle.as_mut() {
            Some(handle) => {
                info!("Disconnecting {} link", link);
                handle.request_shutdown();
                slot.closing = true;
                true
            }
            None => false,
        }
    }

    /// Requests shutdown of every active link.
    pub fn disconnect_all(&mut self) {
        for link in LinkKind::ALL {
            self.request_disconnect(link);
        }
    }

    /// Applies a status event from an adapter.
    ///
    /// Events from an old epoch are ignored. Returns `true` if applied.
    pub fn apply_status(
        &mut self,
        link: LinkKind,
        epoch: u64,
        state: ConnectionState,
        detail: Option<String>,
    ) -> bool {
        let slot = self.link_mut(link);
        if epoch != slot.epoch {
            debug!("Ignoring stale {} status {} (epoch {} != {})", link, state, epoch, slot.epoch);
            return false;
        }

        match &detail {
            Some(text) => info!("{} link {}: {}", link, state, text),
            None => info!("{} link {}", link, state),
        }

        slot.state = state;
        slot.detail = detail;
        if state == ConnectionState::Disconnected {
            // Adapter task has exited and dropped its connection
            slot.handle = None;
            slot.closing = false;
        }
        true
    }

    /// True if a fragment tagged (`link`, `epoch`) may be merged.
    #[must_use]
    pub fn accepts_fragment(&self, link: LinkKind, epoch: u64) -> bool {
        let slot = self.link(link);
        slot.epoch == epoch && slot.is_connected()
    }
}
