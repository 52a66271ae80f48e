//! Boundary to the peer-connection library.
//!
//! The session never talks to a network directly. It drives a [`Transport`]
//! through synchronous calls and learns about everything that happens on the
//! other side through a stream of [`TransportEvent`]s.

use sendover_protocol::Packet;

use crate::error::TransportError;

/// Ordered, reliable, message-based channel to a single remote peer,
/// plus registration of the local identifier with a discovery service.
pub trait Transport: Send + 'static {
    /// Registers `id` so remote peers can reach us.
    ///
    /// Completion is reported as [`TransportEvent::Registered`] or a
    /// [`TransportEvent::PeerError`].
    fn register(&mut self, id: &str) -> Result<(), TransportError>;

    /// Opens a channel to `remote`. Completion is reported as
    /// [`TransportEvent::Open`].
    fn connect(&mut self, remote: &str) -> Result<(), TransportError>;

    /// Queues `packet` on the open channel.
    fn send(&mut self, packet: &Packet) -> Result<(), TransportError>;

    /// Bytes queued on the channel but not yet delivered.
    fn buffered_amount(&self) -> usize;

    /// Closes the open channel. No [`TransportEvent::Close`] is reported
    /// for a local close.
    fn close(&mut self);

    /// Closes the channel and releases the registered identifier.
    fn destroy(&mut self);
}

/// Everything the transport reports back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The identifier is registered and reachable.
    Registered(String),
    /// Peer-level failure (registration, signaling, outbound connect).
    PeerError(TransportErrorKind),
    /// A remote peer opened a channel to us.
    Incoming { remote: String },
    /// The channel is open and ready for packets.
    Open,
    /// The remote side closed the channel or it was lost.
    Close,
    /// Channel-level failure; the channel itself may survive.
    ChannelError(String),
    /// A decoded packet arrived.
    Message(Packet),
}

/// Peer-level failure categories reported by the peer-connection library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The identifier is already taken.
    UnavailableId,
    Network,
    /// The outbound connect target is not registered.
    PeerUnavailable,
    SocketError,
    ServerError,
    WebRtc,
    /// The runtime cannot support the transport at all.
    BrowserIncompatible,
    InvalidId,
    Other(String),
}

/// How the connection lifecycle reacts to a [`TransportErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Re-issue the identity and retry immediately (bounded).
    Collision,
    /// Notify and retry after a fixed delay (uncapped).
    Transient,
    /// Terminal; no retry.
    Fatal,
    /// Notify only.
    Notify,
}

impl TransportErrorKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportErrorKind::UnavailableId => ErrorClass::Collision,
            TransportErrorKind::Network
            | TransportErrorKind::PeerUnavailable
            | TransportErrorKind::SocketError
            | TransportErrorKind::WebRtc => ErrorClass::Transient,
            TransportErrorKind::BrowserIncompatible => ErrorClass::Fatal,
            TransportErrorKind::ServerError
            | TransportErrorKind::InvalidId
            | TransportErrorKind::Other(_) => ErrorClass::Notify,
        }
    }

    /// Wire-style name, e.g. `"socket-error"`.
    pub fn as_str(&self) -> &str {
        match self {
            TransportErrorKind::UnavailableId => "unavailable-id",
            TransportErrorKind::Network => "network",
            TransportErrorKind::PeerUnavailable => "peer-unavailable",
            TransportErrorKind::SocketError => "socket-error",
            TransportErrorKind::ServerError => "server-error",
            TransportErrorKind::WebRtc => "webrtc",
            TransportErrorKind::BrowserIncompatible => "browser-incompatible",
            TransportErrorKind::InvalidId => "invalid-id",
            TransportErrorKind::Other(name) => name,
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(TransportErrorKind::UnavailableId.class(), ErrorClass::Collision);
        for kind in [
            TransportErrorKind::Network,
            TransportErrorKind::PeerUnavailable,
            TransportErrorKind::SocketError,
            TransportErrorKind::WebRtc,
        ] {
            assert_eq!(kind.class(), ErrorClass::Transient, "{kind}");
        }
        assert_eq!(TransportErrorKind::BrowserIncompatible.class(), ErrorClass::Fatal);
        assert_eq!(TransportErrorKind::ServerError.class(), ErrorClass::Notify);
        assert_eq!(TransportErrorKind::InvalidId.class(), ErrorClass::Notify);
        assert_eq!(TransportErrorKind::Other("x".into()).class(), ErrorClass::Notify);
    }

    #[test]
    fn display_names() {
        assert_eq!(TransportErrorKind::SocketError.to_string(), "socket-error");
        assert_eq!(TransportErrorKind::Other("weird".into()).to_string(), "weird");
    }
}
