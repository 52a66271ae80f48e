//! Chunked file streaming and reassembly for SendOver transfers.
//!
//! The sender reads a [`FileSource`] through a [`ChunkReader`]; the receiver
//! accumulates payloads in an [`AssemblyBuffer`] and materializes an
//! [`Artifact`] once the stream ends.

mod assembly;
mod bundle;
mod chunked;
mod progress;
mod source;
mod validation;

pub use assembly::{Artifact, AssemblyBuffer};
pub use bundle::{Bundler, bundle_name};
pub use chunked::{Chunk, ChunkProfile, ChunkReader, chunk_count};
pub use progress::{SpeedCalculator, format_speed};
pub use source::{DiskFile, FileSource, MemoryFile, guess_mime_type};
pub use validation::validate_file_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("source changed while reading: expected {expected} bytes at offset {offset}")]
    ShortRead { offset: u64, expected: usize },

    #[error("bundling failed: {0}")]
    Bundle(String),
}
