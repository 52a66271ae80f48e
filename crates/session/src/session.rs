//! Session driver and its handle.
//!
//! One tokio task owns a [`Session`] and everything in it: identity,
//! connection state, the active transfer, the pending handshake and the
//! notice queue. Transport events, handle commands and timers are all
//! funnelled through a single `select!` loop, so no two handlers ever run
//! concurrently and no locks are needed.

use std::future::pending;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sendover_protocol::{ConnectionState, Packet, TransferProgress};
use sendover_transfer::{Artifact, Bundler, FileSource, SpeedCalculator};

use crate::error::SessionError;
use crate::identity::IdentityManager;
use crate::latency::{self, LatencyProbe};
use crate::lifecycle::Lifecycle;
use crate::notify::NoticeQueue;
use crate::receiver::Inbound;
use crate::sender::{self, Outbound, OutboundWake, PendingAck};
use crate::transport::{Transport, TransportEvent};
use crate::types::{Command, SessionConfig, SessionSnapshot};

/// The single owner of all per-process session state.
pub struct Session<T: Transport> {
    pub(crate) config: SessionConfig,
    pub(crate) transport: T,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
    pub(crate) identity: IdentityManager,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) latency: LatencyProbe,
    pub(crate) transfer: TransferProgress,
    pub(crate) inbound: Option<Inbound>,
    pub(crate) outbound: Option<Outbound>,
    pub(crate) pending_ack: Option<PendingAck>,
    pub(crate) notices: NoticeQueue,
    pub(crate) speed: SpeedCalculator,
    pub(crate) bundler: Option<Box<dyn Bundler>>,
}

/// Why the driver loop woke up.
enum Wake {
    Transport(TransportEvent),
    Command(Command),
    Rotation,
    Retry,
    Ping,
    NoticeExpiry,
    Outbound(OutboundWake),
}

impl<T: Transport> Session<T> {
    /// Creates a session over `transport` and a handle to drive it.
    ///
    /// Nothing happens until [`run`](Self::run) (or [`spawn`](Self::spawn))
    /// is called.
    pub fn new(
        transport: T,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let cancel = CancellationToken::new();

        let session = Self {
            identity: IdentityManager::new(Box::new(StdRng::from_entropy()), config.code_lifetime),
            latency: LatencyProbe::new(config.ping_interval),
            config,
            transport,
            events,
            commands: command_rx,
            snapshot_tx,
            cancel: cancel.clone(),
            lifecycle: Lifecycle::default(),
            transfer: TransferProgress::default(),
            inbound: None,
            outbound: None,
            pending_ack: None,
            notices: NoticeQueue::new(),
            speed: SpeedCalculator::default(),
            bundler: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
            snapshot_rx,
            cancel,
        };
        (session, handle)
    }

    /// Replaces the code generator, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: impl rand::RngCore + Send + 'static) -> Self {
        self.identity = IdentityManager::new(Box::new(rng), self.config.code_lifetime);
        self
    }

    /// Installs the archiver used for multi-file offers.
    pub fn with_bundler(mut self, bundler: impl Bundler + 'static) -> Self {
        self.bundler = Some(Box::new(bundler));
        self
    }

    /// Runs the driver on a new tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drives the session until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("session started");
        self.reinitialize();
        self.publish();

        loop {
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => Wake::Transport(event),
                    None => {
                        warn!("transport event stream ended");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => Wake::Command(command),
                    None => {
                        debug!("all handles dropped");
                        break;
                    }
                },
                _ = sleep_until(self.identity.rotation_at()) => Wake::Rotation,
                _ = sleep_until(self.lifecycle.retry_at) => Wake::Retry,
                _ = latency::next_tick(&mut self.latency.ticker) => Wake::Ping,
                _ = sleep_until(self.notices.next_expiry()) => Wake::NoticeExpiry,
                step = sender::next_step(&mut self.outbound) => Wake::Outbound(step),
            };

            match wake {
                Wake::Transport(event) => self.handle_transport_event(event),
                Wake::Command(command) => self.handle_command(command),
                Wake::Rotation => self.on_rotation_due(),
                Wake::Retry => self.on_retry_due(),
                Wake::Ping => self.on_ping_due(),
                Wake::NoticeExpiry => {
                    self.notices.expire(Instant::now());
                }
                Wake::Outbound(OutboundWake::Answer(answer)) => self.on_answer(answer),
                Wake::Outbound(OutboundWake::Step) => self.step_outbound(),
            }
            self.publish();
        }

        self.pending_ack = None;
        self.outbound = None;
        self.transport.destroy();
        info!("session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "command");
        match command {
            Command::Connect(target) => self.connect(&target),
            Command::Offer(files) => self.offer(files),
            Command::Accept => self.accept(),
            Command::Reject => self.reject(),
            Command::Disconnect => self.disconnect(),
            Command::Reset => self.reset(),
            Command::DismissNotice(id) => {
                self.notices.remove(id);
            }
            Command::Materialize(reply) => {
                let artifact = self.materialize_download();
                let _ = reply.send(artifact);
            }
        }
    }

    fn on_ping_due(&mut self) {
        if self.lifecycle.state != ConnectionState::Connected {
            self.latency.stop();
            return;
        }
        let ping = self.latency.ping();
        self.send_packet(&ping);
    }

    /// Sends `packet`, logging failures. Returns whether it was queued.
    pub(crate) fn send_packet(&mut self, packet: &Packet) -> bool {
        match self.transport.send(packet) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = %packet.packet_type(), error = %e, "send failed");
                false
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection_state: self.lifecycle.state,
            identity: self.identity.current().cloned(),
            registered: self.identity.is_registered(),
            rotation_deadline: self.identity.rotation_deadline(),
            remote: self.lifecycle.remote.clone(),
            transfer: self.transfer.clone(),
            latency: self.latency.latency(),
            notices: self.notices.iter().cloned().collect(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable front end to a running [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
}

impl SessionHandle {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Connects to a peer by six-digit code or full identifier.
    pub async fn connect(&self, code: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::Connect(code.into())).await
    }

    /// Offers one file, or several bundled into one archive.
    pub async fn offer(&self, files: Vec<Box<dyn FileSource>>) -> Result<(), SessionError> {
        self.send(Command::Offer(files)).await
    }

    /// Accepts the incoming offer.
    pub async fn accept(&self) -> Result<(), SessionError> {
        self.send(Command::Accept).await
    }

    /// Declines the incoming offer.
    pub async fn reject(&self) -> Result<(), SessionError> {
        self.send(Command::Reject).await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.send(Command::Disconnect).await
    }

    /// Returns the transfer to idle and discards any received data.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.send(Command::Reset).await
    }

    pub async fn dismiss_notice(&self, id: u64) -> Result<(), SessionError> {
        self.send(Command::DismissNotice(id)).await
    }

    /// The received file, once a transfer has completed.
    pub async fn materialize_download(&self) -> Result<Option<Artifact>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Materialize(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Stops the driver. The transport is destroyed on the way out.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
