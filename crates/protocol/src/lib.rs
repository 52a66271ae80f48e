//! Wire protocol types for SendOver peer-to-peer file transfer.
//!
//! Every packet travels as a JSON envelope `{"type": "...", "payload": {...}}`
//! over an ordered, reliable message channel.

pub mod constants;
pub mod packet;
pub mod types;

// Re-export primary types for convenience.
pub use constants::PacketType;
pub use packet::{FileChunk, FileHeader, FileRef, Packet, Timestamp};
pub use types::{ConnectionState, TransferProgress, TransferRole, TransferStatus};

/// Errors produced while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}
