//! Error types for the session crate.

use sendover_protocol::ProtocolError;
use sendover_transfer::TransferError;

/// Errors returned by a [`Transport`](crate::Transport) call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no identifier registered")]
    NotRegistered,

    #[error("no open channel")]
    NotConnected,

    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),

    #[error("transport refused: {0}")]
    Refused(String),
}

/// Errors surfaced by the session handle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session task has stopped")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}
