use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::PacketType;

/// Announces a file the sender wants to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    pub chunk_count: u64,
}

/// One slice of file content.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub index: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl std::fmt::Debug for FileChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChunk")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish()
    }
}

/// References a previously announced file by id (END, ACK, REJECT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
}

/// Millisecond timestamp carried by PING and echoed by PONG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub timestamp: u64,
}

/// Envelope for all peer-to-peer communication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Packet {
    #[serde(rename = "HEADER")]
    Header(FileHeader),
    #[serde(rename = "CHUNK")]
    Chunk(FileChunk),
    #[serde(rename = "END")]
    End(FileRef),
    #[serde(rename = "ACK")]
    Ack(FileRef),
    #[serde(rename = "REJECT")]
    Reject(FileRef),
    #[serde(rename = "PING")]
    Ping(Timestamp),
    #[serde(rename = "PONG")]
    Pong(Timestamp),
}

impl Packet {
    pub fn end(id: impl Into<String>) -> Self {
        Packet::End(FileRef { id: id.into() })
    }

    pub fn ack(id: impl Into<String>) -> Self {
        Packet::Ack(FileRef { id: id.into() })
    }

    pub fn reject(id: impl Into<String>) -> Self {
        Packet::Reject(FileRef { id: id.into() })
    }

    pub fn ping(timestamp: u64) -> Self {
        Packet::Ping(Timestamp { timestamp })
    }

    pub fn pong(timestamp: u64) -> Self {
        Packet::Pong(Timestamp { timestamp })
    }

    pub fn chunk(index: u64, data: Vec<u8>) -> Self {
        Packet::Chunk(FileChunk { index, data })
    }

    /// Returns the wire tag of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Header(_) => PacketType::Header,
            Packet::Chunk(_) => PacketType::Chunk,
            Packet::End(_) => PacketType::End,
            Packet::Ack(_) => PacketType::Ack,
            Packet::Reject(_) => PacketType::Reject,
            Packet::Ping(_) => PacketType::Ping,
            Packet::Pong(_) => PacketType::Pong,
        }
    }

    /// Encodes the packet as a JSON envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes and validates a JSON envelope.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let packet: Packet = serde_json::from_slice(bytes)?;
        packet.validate()?;
        Ok(packet)
    }

    /// Rejects packets whose fields cannot describe a real transfer.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Packet::Header(h) => {
                if h.id.is_empty() {
                    return Err(ProtocolError::InvalidPacket("header without file id".into()));
                }
                if h.name.is_empty() {
                    return Err(ProtocolError::InvalidPacket("header without file name".into()));
                }
                if h.size > 0 && h.chunk_count == 0 {
                    return Err(ProtocolError::InvalidPacket(format!(
                        "header announces {} bytes in zero chunks",
                        h.size
                    )));
                }
                Ok(())
            }
            Packet::End(r) | Packet::Ack(r) | Packet::Reject(r) if r.id.is_empty() => Err(
                ProtocolError::InvalidPacket(format!("{} without file id", self.packet_type())),
            ),
            _ => Ok(()),
        }
    }
}

/// Custom base64 serde module for binary chunk payloads.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FileHeader {
        FileHeader {
            id: "f-1".into(),
            name: "report.pdf".into(),
            size: 200_000,
            mime_type: "application/pdf".into(),
            chunk_count: 4,
        }
    }

    #[test]
    fn header_uses_camel_case_fields() {
        let json = serde_json::to_value(Packet::Header(sample_header())).unwrap();
        assert_eq!(json["type"], "HEADER");
        assert_eq!(json["payload"]["mimeType"], "application/pdf");
        assert_eq!(json["payload"]["chunkCount"], 4);
        assert_eq!(json["payload"]["size"], 200_000);
    }

    #[test]
    fn chunk_data_is_base64() {
        let bytes = Packet::chunk(3, b"Hello".to_vec()).to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("SGVsbG8="));

        let parsed = Packet::from_slice(&bytes).unwrap();
        match parsed {
            Packet::Chunk(c) => {
                assert_eq!(c.index, 3);
                assert_eq!(c.data, b"Hello");
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn ping_and_pong_carry_timestamp() {
        let json = serde_json::to_string(&Packet::ping(1234)).unwrap();
        assert_eq!(json, r#"{"type":"PING","payload":{"timestamp":1234}}"#);
        let pong: Packet = serde_json::from_str(r#"{"type":"PONG","payload":{"timestamp":1234}}"#)
            .unwrap();
        assert_eq!(pong, Packet::pong(1234));
    }

    #[test]
    fn packet_type_matches_variant() {
        assert_eq!(Packet::ack("a").packet_type(), PacketType::Ack);
        assert_eq!(Packet::reject("a").packet_type(), PacketType::Reject);
        assert_eq!(Packet::end("a").packet_type(), PacketType::End);
        assert_eq!(Packet::ping(0).packet_type(), PacketType::Ping);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = Packet::from_slice(br#"{"type":"NOPE","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = Packet::from_slice(br#"{"type":"CHUNK","payload":{"index":0,"data":"***"}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn negative_size_is_rejected() {
        let raw = br#"{"type":"HEADER","payload":{"id":"x","name":"a","size":-1,"mimeType":"","chunkCount":1}}"#;
        assert!(Packet::from_slice(raw).is_err());
    }

    #[test]
    fn header_without_chunks_for_nonempty_file_is_invalid() {
        let mut header = sample_header();
        header.chunk_count = 0;
        let err = Packet::Header(header).validate().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPacket(_)));
    }

    #[test]
    fn empty_file_header_is_valid() {
        let header = FileHeader {
            size: 0,
            chunk_count: 0,
            ..sample_header()
        };
        assert!(Packet::Header(header).validate().is_ok());
    }

    #[test]
    fn ack_without_id_is_invalid() {
        let err = Packet::from_slice(br#"{"type":"ACK","payload":{"id":""}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPacket(_)));
    }

    #[test]
    fn missing_mime_type_defaults_to_empty() {
        let raw = br#"{"type":"HEADER","payload":{"id":"x","name":"a.bin","size":1,"chunkCount":1}}"#;
        match Packet::from_slice(raw).unwrap() {
            Packet::Header(h) => assert!(h.mime_type.is_empty()),
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn chunk_debug_omits_payload() {
        let dbg = format!("{:?}", FileChunk { index: 1, data: vec![0; 4096] });
        assert!(dbg.contains("len: 4096"));
        assert!(!dbg.contains("0, 0, 0"));
    }
}
