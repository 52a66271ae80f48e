//! Connection lifecycle: registration, retries, connect and disconnect.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//!                  |              |
//!                  +--> Error <---+   (fatal transport failure)
//! Error -> Disconnected               (reset or successful re-registration)
//! ```

use tokio::time::Instant;
use tracing::{error, info, warn};

use sendover_protocol::{ConnectionState, TransferRole, TransferStatus};

use crate::identity::expand_target;
use crate::session::Session;
use crate::transport::{ErrorClass, Transport, TransportErrorKind, TransportEvent};

/// Connection bookkeeping owned by the session.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    pub(crate) state: ConnectionState,
    /// Identifier of the peer we are connected or connecting to.
    pub(crate) remote: Option<String>,
    /// Consecutive identifier collisions since the last registration.
    pub(crate) collisions: u32,
    /// Set while retrying after a collision or transient failure.
    pub(crate) recovering: bool,
    /// When the next transient-failure retry fires.
    pub(crate) retry_at: Option<Instant>,
}

/// How a connection came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionEnd {
    /// The remote side closed or the link dropped.
    Lost,
    /// The local user disconnected.
    Manual,
}

impl<T: Transport> Session<T> {
    pub(crate) fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Registered(id) => self.on_registered(&id),
            TransportEvent::PeerError(kind) => self.on_peer_error(kind),
            TransportEvent::Incoming { remote } => self.on_incoming(remote),
            TransportEvent::Open => self.on_open(),
            TransportEvent::Close => self.on_close(),
            TransportEvent::ChannelError(reason) => {
                warn!(%reason, "data channel error");
                self.notices.error("Data connection interrupted", Instant::now());
            }
            TransportEvent::Message(packet) => self.dispatch(packet),
        }
    }

    /// Drops the current identity and registers a fresh one.
    pub(crate) fn reinitialize(&mut self) {
        if self.lifecycle.state.is_engaged() {
            self.end_connection(ConnectionEnd::Lost);
        }
        self.transport.destroy();
        self.lifecycle.retry_at = None;

        let identity = self.identity.issue(Instant::now());
        info!(id = %identity.id, "registering identity");
        if let Err(e) = self.transport.register(&identity.id) {
            warn!(id = %identity.id, error = %e, "registration refused");
            self.schedule_retry(&TransportErrorKind::Other(e.to_string()));
        }
    }

    fn on_registered(&mut self, id: &str) {
        if !self.identity.mark_registered(id, Instant::now()) {
            warn!(id, "registration for a stale identity ignored");
            return;
        }
        info!(id, "identity registered");
        self.lifecycle.collisions = 0;

        let recovered = std::mem::take(&mut self.lifecycle.recovering);
        if recovered {
            self.notices.success("Reconnected to network", Instant::now());
        }
        if (recovered || self.lifecycle.state == ConnectionState::Error)
            && !self.lifecycle.state.is_engaged()
        {
            self.lifecycle.state = ConnectionState::Disconnected;
        }
    }

    fn on_peer_error(&mut self, kind: TransportErrorKind) {
        let now = Instant::now();
        match kind.class() {
            ErrorClass::Collision => {
                self.lifecycle.collisions += 1;
                if self.lifecycle.collisions > self.config.max_collision_retries {
                    error!(
                        collisions = self.lifecycle.collisions,
                        "identifier collisions exhausted"
                    );
                    self.transport.destroy();
                    self.lifecycle.recovering = false;
                    self.lifecycle.state = ConnectionState::Error;
                    self.notices.error(
                        "Unable to connect to signaling server. Please refresh.",
                        now,
                    );
                    return;
                }
                warn!(attempt = self.lifecycle.collisions, "identifier collision, re-issuing");
                self.lifecycle.recovering = true;
                self.reinitialize();
            }
            ErrorClass::Transient => {
                warn!(%kind, "transient transport failure");
                self.notices
                    .warning(format!("Network issue: {kind}. Retrying..."), now);
                self.schedule_retry(&kind);
            }
            ErrorClass::Fatal => {
                error!(%kind, "transport unsupported");
                if self.lifecycle.state.is_engaged() {
                    self.transport.close();
                    self.end_connection(ConnectionEnd::Lost);
                }
                self.lifecycle.retry_at = None;
                self.lifecycle.state = ConnectionState::Error;
                self.notices
                    .error("This runtime does not support the peer transport.", now);
            }
            ErrorClass::Notify => {
                warn!(%kind, "peer error");
                if kind != TransportErrorKind::InvalidId {
                    self.notices.error(format!("Connection Error: {kind}"), now);
                    return;
                }
                self.notices.error("Invalid Peer ID.", now);
                // Only a bad connect target is reported this way.
                if self.lifecycle.state == ConnectionState::Connecting {
                    self.lifecycle.state = ConnectionState::Disconnected;
                    self.lifecycle.remote = None;
                    self.identity.rearm_rotation(now);
                }
            }
        }
    }

    fn schedule_retry(&mut self, kind: &TransportErrorKind) {
        let delay = self.config.transient_retry_delay;
        info!(%kind, delay_ms = delay.as_millis() as u64, "retry scheduled");
        self.lifecycle.recovering = true;
        self.lifecycle.retry_at = Some(Instant::now() + delay);
    }

    pub(crate) fn on_retry_due(&mut self) {
        self.lifecycle.retry_at = None;
        self.reinitialize();
    }

    pub(crate) fn on_rotation_due(&mut self) {
        if self.identity.check_rotation(self.lifecycle.state) {
            self.reinitialize();
        }
    }

    /// Opens a connection to the peer behind `input`.
    pub(crate) fn connect(&mut self, input: &str) {
        let now = Instant::now();
        if !self.identity.is_registered() {
            self.notices.error("Peer not initialized yet", now);
            return;
        }
        let target = expand_target(input);
        if self.identity.id() == Some(target.as_str()) {
            self.notices.warning("You cannot connect to yourself", now);
            return;
        }
        if self.lifecycle.state.is_engaged() {
            warn!(state = ?self.lifecycle.state, %target, "connect ignored: already engaged");
            return;
        }

        match self.transport.connect(&target) {
            Ok(()) => {
                info!(remote = %target, "connecting");
                self.begin_connecting(target);
            }
            Err(e) => {
                warn!(remote = %target, error = %e, "connect failed");
                self.notices.error("Connection failed", now);
            }
        }
    }

    fn on_incoming(&mut self, remote: String) {
        if self.lifecycle.state.is_engaged() {
            warn!(%remote, "incoming connection ignored: already engaged");
            return;
        }
        info!(%remote, "incoming connection");
        self.begin_connecting(remote);
    }

    fn begin_connecting(&mut self, remote: String) {
        self.lifecycle.state = ConnectionState::Connecting;
        self.lifecycle.remote = Some(remote);
        self.identity.suspend_rotation();
    }

    fn on_open(&mut self) {
        if self.lifecycle.state != ConnectionState::Connecting {
            warn!(state = ?self.lifecycle.state, "unexpected channel open");
            return;
        }
        info!(remote = ?self.lifecycle.remote, "connection established");
        self.lifecycle.state = ConnectionState::Connected;
        self.latency.start();
        self.notices
            .success("Secure connection established", Instant::now());
    }

    fn on_close(&mut self) {
        if !self.lifecycle.state.is_engaged() {
            return;
        }
        info!(remote = ?self.lifecycle.remote, "peer disconnected");
        self.end_connection(ConnectionEnd::Lost);
        self.notices.warning("Peer disconnected", Instant::now());
    }

    /// Closes the connection on local request. No-op without one.
    pub(crate) fn disconnect(&mut self) {
        if !self.lifecycle.state.is_engaged() {
            return;
        }
        info!(remote = ?self.lifecycle.remote, "disconnecting");
        self.transport.close();
        self.end_connection(ConnectionEnd::Manual);
        self.notices.info("Disconnected manually", Instant::now());
    }

    /// Tears down per-connection state once the channel is gone.
    pub(crate) fn end_connection(&mut self, end: ConnectionEnd) {
        self.lifecycle.state = ConnectionState::Disconnected;
        self.lifecycle.remote = None;
        self.latency.stop();

        // Dropping the pending answer resolves the waiter as a failure.
        self.pending_ack = None;
        self.outbound = None;
        if matches!(
            self.transfer.status,
            TransferStatus::Waiting | TransferStatus::Transferring
        ) {
            warn!(?end, file = %self.transfer.file_id, "transfer cut off by disconnect");
            self.transfer.fail("Connection lost or transfer failed");
        } else if self.transfer.role == TransferRole::Receiver
            && self.transfer.status == TransferStatus::Incoming
        {
            // The offer belongs to the peer that just left.
            info!(?end, file = %self.transfer.file_id, "unanswered offer discarded");
            self.clear_transfer();
        }

        self.identity.rearm_rotation(Instant::now());
    }
}
