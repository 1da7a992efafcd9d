#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! On-disk layout of the `.kysync` artifact.
//!
//! The artifact opens with a varint-length-delimited protobuf [`Header`]
//! followed by three dense packed arrays, in this order and with no
//! per-element framing:
//!
//! ```text
//! [header]  { version = 2, size, block_size, hash }
//! [weak]    u32 little-endian               x block_count
//! [strong]  (hi u64 LE, lo u64 LE)          x block_count
//! [csize]   i64 little-endian               x block_count
//! ```
//!
//! Array offsets are derived from the header length plus the cumulative
//! packed sizes, so readers can fetch each array with a single ranged read.
//! Version 2 is the only version accepted at read time; a future layout
//! change must bump the version, which this module rejects loudly.

mod arrays;
mod header;

pub use arrays::{
    STRONG_RECORD_LEN, decode_compressed_sizes, decode_strong_checksums, decode_weak_checksums,
    encode_compressed_sizes, encode_strong_checksums, encode_weak_checksums,
};
pub use header::{Header, SUPPORTED_VERSION, read_header, write_header};

use std::io;

use thiserror::Error;

/// Failures while encoding or decoding artifact metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The header envelope could not be decoded.
    #[error("malformed artifact header: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The header buffer ends before the declared record does.
    #[error("artifact header is truncated")]
    TruncatedHeader,

    /// The artifact was produced by an incompatible format revision.
    #[error("unsupported artifact version {0}, expected {SUPPORTED_VERSION}")]
    UnsupportedVersion(i32),

    /// A packed array's byte length is not a whole number of records.
    #[error("packed array of {actual} bytes is not a multiple of {record_len}-byte records")]
    MisalignedArray {
        /// Byte length that was presented.
        actual: usize,
        /// Record width the array requires.
        record_len: usize,
    },

    /// A stored integer does not fit the in-memory representation.
    #[error("value {0} is out of range for the artifact format")]
    OutOfRange(i128),

    /// Underlying write failure.
    #[error("metadata i/o failure: {0}")]
    Io(#[from] io::Error),
}
