use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Fatal failures of the prepare and sync pipelines.
///
/// Local recovery is never attempted: the first error aborts the run and
/// surfaces as a non-zero exit code.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Local file I/O failed.
    #[error("i/o failure on {}: {source}", .path.display())]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A reader could not be created or read from.
    #[error(transparent)]
    Reader(#[from] readers::ReaderError),

    /// The block codec rejected data.
    #[error(transparent)]
    Codec(#[from] compress::CodecError),

    /// The artifact metadata is malformed or incompatible.
    #[error(transparent)]
    Metadata(#[from] metadata::MetadataError),

    /// The shared output file could not be managed.
    #[error(transparent)]
    FileStream(#[from] file_stream::FileStreamError),

    /// A full read came back short.
    #[error("short read at offset {offset}: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Offset of the read.
        offset: u64,
        /// Bytes expected.
        expected: u64,
        /// Bytes received.
        got: u64,
    },

    /// A retrieved block has the wrong length.
    #[error("block {index} came back with {actual} bytes, expected {expected}")]
    BlockLength {
        /// Block index.
        index: usize,
        /// Length the artifact mandates for this block.
        expected: u64,
        /// Length received.
        actual: u64,
    },

    /// A batched response chunk does not line up with the request queue.
    #[error("retrieved chunk at offset {offset} does not match the batched request at {expected}")]
    MisalignedChunk {
        /// Offset the response chunk claims.
        offset: u64,
        /// Offset the next queued request expects.
        expected: u64,
    },

    /// The reconstructed output does not hash to the artifact's digest.
    #[error("hash mismatch in reconstructed data: expected {expected}, computed {computed}")]
    HashMismatch {
        /// Digest recorded in the artifact header.
        expected: String,
        /// Digest of the reconstructed output.
        computed: String,
    },
}

pub(crate) fn io_error(path: &Path, source: io::Error) -> EngineError {
    EngineError::Io {
        path: path.to_path_buf(),
        source,
    }
}
