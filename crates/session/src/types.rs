//! Public types for the session driver.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use sendover_protocol::constants::{
    BACKPRESSURE_POLL, BACKPRESSURE_WATERMARK, CODE_TIMEOUT, MAX_COLLISION_RETRIES, PING_INTERVAL,
    TRANSIENT_RETRY_DELAY,
};
use sendover_protocol::{ConnectionState, TransferProgress};
use sendover_transfer::{Artifact, ChunkProfile, FileSource};

use crate::identity::PeerIdentity;
use crate::notify::Notice;

/// Tunables for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Lifetime of an identity before it may rotate.
    pub code_lifetime: Duration,
    /// Period of latency pings while connected.
    pub ping_interval: Duration,
    /// Outgoing chunk size in bytes.
    pub chunk_size: usize,
    /// Buffered bytes above which chunk sends pause.
    pub backpressure_watermark: usize,
    /// Pause length while above the watermark.
    pub backpressure_poll: Duration,
    /// Consecutive identifier collisions tolerated before giving up.
    pub max_collision_retries: u32,
    /// Delay before re-registering after a transient failure.
    pub transient_retry_delay: Duration,
    /// Capacity of the command channel between handles and the driver.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            code_lifetime: CODE_TIMEOUT,
            ping_interval: PING_INTERVAL,
            chunk_size: ChunkProfile::detect().chunk_size(),
            backpressure_watermark: BACKPRESSURE_WATERMARK,
            backpressure_poll: BACKPRESSURE_POLL,
            max_collision_retries: MAX_COLLISION_RETRIES,
            transient_retry_delay: TRANSIENT_RETRY_DELAY,
            command_buffer: 64,
        }
    }
}

/// Everything the presentation layer needs to render a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub connection_state: ConnectionState,
    /// Current identity, registered or not.
    pub identity: Option<PeerIdentity>,
    /// Whether `identity` is registered with the transport.
    pub registered: bool,
    /// When the identity is next eligible for rotation.
    pub rotation_deadline: Option<DateTime<Utc>>,
    /// Identifier of the connected (or connecting) peer.
    pub remote: Option<String>,
    pub transfer: TransferProgress,
    /// Last measured round trip; `None` unless connected.
    pub latency: Option<Duration>,
    pub notices: Vec<Notice>,
}

/// Requests from a [`SessionHandle`](crate::SessionHandle) to the driver.
pub(crate) enum Command {
    Connect(String),
    Offer(Vec<Box<dyn FileSource>>),
    Accept,
    Reject,
    Disconnect,
    Reset,
    DismissNotice(u64),
    Materialize(oneshot::Sender<Option<Artifact>>),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect(target) => f.debug_tuple("Connect").field(target).finish(),
            Command::Offer(files) => f.debug_tuple("Offer").field(&files.len()).finish(),
            Command::Accept => f.write_str("Accept"),
            Command::Reject => f.write_str("Reject"),
            Command::Disconnect => f.write_str("Disconnect"),
            Command::Reset => f.write_str("Reset"),
            Command::DismissNotice(id) => f.debug_tuple("DismissNotice").field(id).finish(),
            Command::Materialize(_) => f.write_str("Materialize"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_follow_protocol_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.code_lifetime, Duration::from_secs(120));
        assert_eq!(config.ping_interval, Duration::from_secs(2));
        assert_eq!(config.backpressure_watermark, 1024 * 1024);
        assert_eq!(config.backpressure_poll, Duration::from_millis(50));
        assert_eq!(config.max_collision_retries, 10);
        assert_eq!(config.transient_retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn empty_snapshot_is_idle_and_disconnected() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert!(snapshot.latency.is_none());
        assert!(snapshot.notices.is_empty());
    }
}
