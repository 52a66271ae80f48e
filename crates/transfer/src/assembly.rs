use std::sync::Arc;

use tracing::debug;

/// A fully received file, ready to hand to a download integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Receiver-side accumulator for one incoming file.
///
/// Payloads are kept in arrival order. Ordering and completeness are the
/// transport's responsibility; nothing here reorders or fills gaps.
#[derive(Debug, Default)]
pub struct AssemblyBuffer {
    parts: Vec<Vec<u8>>,
    received: u64,
    artifact: Option<Artifact>,
}

impl AssemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk payload. Returns the running received byte count.
    pub fn push(&mut self, data: Vec<u8>) -> u64 {
        self.received += data.len() as u64;
        self.parts.push(data);
        self.received
    }

    /// Total bytes received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Number of chunks received so far.
    pub fn chunk_count(&self) -> usize {
        self.parts.len()
    }

    /// Concatenates the received payloads into an [`Artifact`].
    ///
    /// Only the first call builds the artifact; later calls return the same
    /// one.
    pub fn finalize(&mut self, file_name: &str, mime_type: &str) -> &Artifact {
        let parts = &mut self.parts;
        let received = self.received;
        self.artifact.get_or_insert_with(|| {
            let mut bytes = Vec::with_capacity(received as usize);
            for part in parts.drain(..) {
                bytes.extend_from_slice(&part);
            }
            debug!(file = %file_name, bytes = bytes.len(), "assembled artifact");
            Artifact {
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                bytes: bytes.into(),
            }
        })
    }

    /// The materialized artifact, if [`finalize`](Self::finalize) ran.
    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }
}
