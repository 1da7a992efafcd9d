#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Per-block compression codec.
//!
//! Blocks are compressed independently with zstd so the sync pipeline can
//! fetch and decode any subset of them. Every frame produced here embeds its
//! uncompressed size in the frame header; [`decompress_into`] refuses frames
//! whose declared size is unknown or larger than the destination block, so a
//! corrupt or foreign payload fails before a single byte is written.

use std::io;

use thiserror::Error;

/// Compression level used by the prepare pipeline.
///
/// Level 1 favors throughput; the payload is usually network-bound, not
/// ratio-bound.
pub const DEFAULT_LEVEL: i32 = 1;

/// Errors raised by the block codec. All of them are fatal for the
/// surrounding run.
#[derive(Debug, Error)]
pub enum CodecError {
    /// zstd rejected the input during compression.
    #[error("block compression failed: {0}")]
    Compress(#[source] io::Error),

    /// zstd rejected the frame during decompression.
    #[error("block decompression failed: {0}")]
    Decompress(#[source] io::Error),

    /// The frame header does not carry an uncompressed size.
    #[error("compressed frame does not declare its content size")]
    ContentSizeUnknown,

    /// The input is not a zstd frame at all.
    #[error("buffer is not a valid zstd frame")]
    InvalidFrame,

    /// The declared uncompressed size does not fit in the destination block.
    #[error("frame content size {content_size} exceeds block capacity {capacity}")]
    ContentSizeTooLarge {
        /// Uncompressed size declared by the frame.
        content_size: u64,
        /// Destination buffer capacity in bytes.
        capacity: usize,
    },
}

/// Worst-case compressed size for a block of `source_size` bytes.
#[must_use]
pub fn compress_bound(source_size: usize) -> usize {
    zstd::zstd_safe::compress_bound(source_size)
}

/// Compresses `source` into `destination`, returning the frame length.
///
/// `destination` must hold at least [`compress_bound`] of the source length.
pub fn compress_into(
    source: &[u8],
    destination: &mut [u8],
    level: i32,
) -> Result<usize, CodecError> {
    zstd::bulk::compress_to_buffer(source, destination, level).map_err(CodecError::Compress)
}

/// Decompresses one frame from `source` into `destination`, returning the
/// number of bytes produced.
///
/// The frame's declared content size is validated against
/// `destination.len()` before any decompression work happens.
pub fn decompress_into(source: &[u8], destination: &mut [u8]) -> Result<usize, CodecError> {
    let content_size = zstd::zstd_safe::get_frame_content_size(source)
        .map_err(|_| CodecError::InvalidFrame)?
        .ok_or(CodecError::ContentSizeUnknown)?;
    if content_size > destination.len() as u64 {
        return Err(CodecError::ContentSizeTooLarge {
            content_size,
            capacity: destination.len(),
        });
    }

    zstd::bulk::decompress_to_buffer(source, destination).map_err(CodecError::Decompress)
}
