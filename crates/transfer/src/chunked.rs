use sendover_protocol::constants::{CONSERVATIVE_CHUNK_SIZE, STANDARD_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::TransferError;
use crate::source::FileSource;

/// Environment variable selecting the chunk profile.
pub const CHUNK_PROFILE_ENV: &str = "SENDOVER_CHUNK_PROFILE";

/// A slice of file data ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based sequence number.
    pub index: u64,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

/// Number of chunks needed to send `size` bytes.
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size as u64)
}

// ---------------------------------------------------------------------------
// ChunkProfile
// ---------------------------------------------------------------------------

/// How large a chunk the local runtime can push through its channel.
///
/// Picked once per process and never renegotiated with the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkProfile {
    /// 64 KiB chunks.
    #[default]
    Standard,
    /// 16 KiB chunks.
    Conservative,
}

impl ChunkProfile {
    pub fn chunk_size(self) -> usize {
        match self {
            ChunkProfile::Standard => STANDARD_CHUNK_SIZE,
            ChunkProfile::Conservative => CONSERVATIVE_CHUNK_SIZE,
        }
    }

    /// Reads [`CHUNK_PROFILE_ENV`], falling back to `Standard`.
    pub fn detect() -> Self {
        match std::env::var(CHUNK_PROFILE_ENV) {
            Ok(value) => Self::parse(&value).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(ChunkProfile::Standard),
            "conservative" => Some(ChunkProfile::Conservative),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file source in sequential, non-overlapping fixed-size chunks.
///
/// Chunk `k` covers `[k * chunk_size, min((k + 1) * chunk_size, size))`.
pub struct ChunkReader {
    source: Box<dyn FileSource>,
    chunk_size: usize,
    offset: u64,
    index: u64,
}

impl ChunkReader {
    /// Wraps `source` for chunked reading.
    ///
    /// If `chunk_size` is 0, the standard 64 KiB size is used.
    pub fn new(source: Box<dyn FileSource>, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            STANDARD_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            source,
            chunk_size,
            offset: 0,
            index: 0,
        }
    }

    /// Reads the next chunk. Returns `None` once every byte has been read.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.source
            .read_at(self.offset, &mut buf)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => TransferError::ShortRead {
                    offset: self.offset,
                    expected: read_size,
                },
                _ => TransferError::Io(e),
            })?;

        let chunk = Chunk {
            index: self.index,
            offset: self.offset,
            data: buf,
        };
        trace!(index = chunk.index, offset = chunk.offset, len = read_size, "read chunk");
        self.offset += read_size as u64;
        self.index += 1;
        Ok(Some(chunk))
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn mime_type(&self) -> &str {
        self.source.mime_type()
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.source.size()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks the whole file splits into.
    pub fn chunk_count(&self) -> u64 {
        chunk_count(self.file_size(), self.chunk_size)
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size().saturating_sub(self.offset)
    }
}
