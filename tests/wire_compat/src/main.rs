fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use sendover_protocol::{Packet, PacketType, TransferProgress, TransferStatus};

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Normalizes JSON numbers so that `65` and `65.0` compare equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  encoded: {reserialized}"
        );
        parsed
    }

    /// Round-trips a packet fixture and checks its tag and validity.
    fn packet_fixture(name: &str, expected: PacketType) -> Packet {
        let packet = roundtrip_test::<Packet>(name);
        assert_eq!(packet.packet_type(), expected, "{name}");
        let bytes = read_fixture(name);
        Packet::from_slice(bytes.as_bytes())
            .unwrap_or_else(|e| panic!("{name} rejected by the decoder: {e}"))
    }

    // --- Packets ---

    #[test]
    fn fixture_header() {
        match packet_fixture("header.json", PacketType::Header) {
            Packet::Header(h) => {
                assert_eq!(h.name, "report.pdf");
                assert_eq!(h.size, 200_000);
                assert_eq!(h.chunk_count, 4);
                assert_eq!(h.mime_type, "application/pdf");
            }
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn fixture_chunk() {
        match packet_fixture("chunk.json", PacketType::Chunk) {
            Packet::Chunk(c) => {
                assert_eq!(c.index, 3);
                assert_eq!(c.data, b"Hello SendOver");
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn fixture_file_references() {
        for (name, tag) in [
            ("end.json", PacketType::End),
            ("ack.json", PacketType::Ack),
            ("reject.json", PacketType::Reject),
        ] {
            let packet = packet_fixture(name, tag);
            let id = match packet {
                Packet::End(r) | Packet::Ack(r) | Packet::Reject(r) => r.id,
                other => panic!("expected file reference, got {other:?}"),
            };
            assert_eq!(id, "7f1c2a9e-3b4d-4e5f-8a6b-0c1d2e3f4a5b");
        }
    }

    #[test]
    fn fixture_ping_pong_share_timestamp() {
        let ping = packet_fixture("ping.json", PacketType::Ping);
        let pong = packet_fixture("pong.json", PacketType::Pong);
        match (ping, pong) {
            (Packet::Ping(a), Packet::Pong(b)) => assert_eq!(a, b),
            other => panic!("unexpected pair {other:?}"),
        }
    }

    // --- Presentation state ---

    #[test]
    fn fixture_transfer_progress() {
        let progress = roundtrip_test::<TransferProgress>("transfer_progress.json");
        assert_eq!(progress.status, TransferStatus::Transferring);
        assert_eq!(progress.speed.as_deref(), Some("2.5 MB/s"));
    }

    #[test]
    fn fixture_transfer_progress_error() {
        let progress = roundtrip_test::<TransferProgress>("transfer_progress_error.json");
        assert_eq!(progress.status, TransferStatus::Error);
        assert_eq!(
            progress.error_message.as_deref(),
            Some("Transfer declined by peer")
        );
        assert!(progress.file_id.is_empty());
    }

    // --- Malformed input ---

    #[test]
    fn malformed_packets_are_rejected() {
        let dir = fixtures_dir().join("malformed");
        let mut entries: Vec<_> = fs::read_dir(&dir)
            .unwrap_or_else(|e| panic!("failed to list {}: {e}", dir.display()))
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        assert!(!entries.is_empty());

        for path in entries {
            let bytes = fs::read(&path).unwrap();
            assert!(
                Packet::from_slice(&bytes).is_err(),
                "{} was accepted",
                path.display()
            );
        }
    }
}
