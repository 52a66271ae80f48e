use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Namespace prepended to every session code to form a peer identifier.
pub const PEER_ID_PREFIX: &str = "sendover-";

/// Number of decimal digits in a session code.
pub const CODE_LENGTH: usize = 6;

/// Lifetime of a session code before it becomes eligible for rotation.
pub const CODE_TIMEOUT: Duration = Duration::from_secs(120);

/// How often a connected peer sends latency pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(2);

/// Outbound buffered bytes above which the sender pauses between chunks.
pub const BACKPRESSURE_WATERMARK: usize = 1024 * 1024;

/// Pause applied while the outbound buffer sits above the watermark.
pub const BACKPRESSURE_POLL: Duration = Duration::from_millis(50);

/// Chunk size for runtimes that fragment large data-channel messages.
pub const CONSERVATIVE_CHUNK_SIZE: usize = 16 * 1024;

/// Chunk size for runtimes that handle large messages efficiently.
pub const STANDARD_CHUNK_SIZE: usize = 64 * 1024;

/// Consecutive identifier collisions tolerated before giving up.
pub const MAX_COLLISION_RETRIES: u32 = 10;

/// Delay before re-registering after a transient network failure.
pub const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Packet type tag carried in the `type` field of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketType {
    Header,
    Chunk,
    End,
    Ack,
    Reject,
    Ping,
    Pong,
}

impl PacketType {
    /// Wire tag for this packet type.
    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::Header => "HEADER",
            PacketType::Chunk => "CHUNK",
            PacketType::End => "END",
            PacketType::Ack => "ACK",
            PacketType::Reject => "REJECT",
            PacketType::Ping => "PING",
            PacketType::Pong => "PONG",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_serializes_as_wire_tag() {
        for ty in [
            PacketType::Header,
            PacketType::Chunk,
            PacketType::End,
            PacketType::Ack,
            PacketType::Reject,
            PacketType::Ping,
            PacketType::Pong,
        ] {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }

    #[test]
    fn code_timeout_outlives_ping_interval() {
        assert!(CODE_TIMEOUT > PING_INTERVAL);
        assert_eq!(CODE_TIMEOUT.as_secs(), 120);
    }

    #[test]
    fn chunk_sizes_fit_under_watermark() {
        assert!(STANDARD_CHUNK_SIZE < BACKPRESSURE_WATERMARK);
        assert!(CONSERVATIVE_CHUNK_SIZE < STANDARD_CHUNK_SIZE);
    }
}
