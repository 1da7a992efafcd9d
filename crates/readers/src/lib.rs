#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Random-access byte sources behind a single uniform interface.
//!
//! [`Reader::create`] selects the backing implementation from the URI
//! scheme:
//!
//! - `http://host[:port]/path` and `https://...` issue ranged GETs,
//!   including batched multi-range requests with `multipart/byteranges`
//!   response parsing;
//! - `file:///absolute/path` reads a local file (and fails at creation when
//!   the path does not exist);
//! - `memory://<hex-address>:<hex-size>` reads a previously
//!   [published](MemoryReader::publish) in-process buffer, which tests use
//!   to stand in for real sources.
//!
//! The reader variants are a closed set, so dispatch is a plain `match`
//! rather than a trait object. Every reader counts `total_reads` and
//! `total_bytes_read`.

mod file;
mod http;
mod memory;
mod multipart;

pub use file::FileReader;
pub use http::HttpReader;
pub use memory::MemoryReader;

use std::io;
use std::path::PathBuf;

use observability::{Metric, MetricContainer, MetricVisitor};
use thiserror::Error;

/// One entry of a batched retrieval: where to read from the source and
/// where the caller intends to put the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRetrievalInfo {
    /// Block the bytes belong to.
    pub block_index: usize,
    /// Absolute offset of the first byte in the source.
    pub source_begin_offset: u64,
    /// Number of bytes to retrieve.
    pub size_to_read: u64,
    /// Output offset reserved by the caller for this entry.
    pub offset_to_write_to: u64,
}

/// Failures raised by reader creation and reads. All are fatal for the
/// surrounding run.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The URI does not use a supported scheme.
    #[error("unknown scheme in uri {0}")]
    UnknownScheme(String),

    /// A `memory://` URI is not `<hex-address>:<hex-size>`.
    #[error("malformed memory uri {0}")]
    MalformedMemoryUri(String),

    /// A `memory://` URI names an address no buffer was published under.
    #[error("no buffer published for memory uri {0}")]
    UnpublishedBuffer(String),

    /// A `memory://` URI declares more bytes than the buffer holds.
    #[error("memory uri {uri} declares {declared} bytes but the buffer holds {actual}")]
    MemorySizeMismatch {
        /// Offending URI.
        uri: String,
        /// Size declared in the URI.
        declared: u64,
        /// Size of the published buffer.
        actual: u64,
    },

    /// A `file://` URI names a path that does not exist.
    #[error("path {} not found for uri {uri}", .path.display())]
    MissingFile {
        /// Offending URI.
        uri: String,
        /// Resolved local path.
        path: PathBuf,
    },

    /// Local file I/O failed.
    #[error("i/o failure reading {}: {source}", .path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The http(s) URI could not be parsed.
    #[error("invalid http uri {uri}: {source}")]
    InvalidHttpUri {
        /// Offending URI.
        uri: String,
        /// Parser diagnostics.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client failed below the protocol level.
    #[error("http transport failure for {uri}: {source}")]
    Http {
        /// Request target.
        uri: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an unusable status.
    #[error("unexpected http status {status} for {uri}")]
    HttpStatus {
        /// Request target.
        uri: String,
        /// Status code received.
        status: u16,
    },

    /// A required response header is absent or unparseable.
    #[error("response for {uri} is missing a usable {header} header")]
    MissingHeader {
        /// Request target.
        uri: String,
        /// Header that was expected.
        header: &'static str,
    },

    /// The `multipart/byteranges` body violates its own framing.
    #[error("malformed multipart/byteranges response: {0}")]
    Multipart(&'static str),

    /// Fewer bytes than requested came back from a position where the
    /// source had more.
    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        /// Offset of the read.
        offset: u64,
        /// Bytes requested.
        wanted: u64,
        /// Bytes received.
        got: u64,
    },
}

enum Kind {
    File(FileReader),
    Http(HttpReader),
    Memory(MemoryReader),
}

/// A random-access byte source selected by URI scheme.
pub struct Reader {
    kind: Kind,
    total_reads: Metric,
    total_bytes_read: Metric,
}

impl Reader {
    /// Opens the reader matching the URI scheme. See the crate docs for the
    /// grammar.
    pub fn create(uri: &str) -> Result<Self, ReaderError> {
        let kind = if uri.starts_with("http://") || uri.starts_with("https://") {
            Kind::Http(HttpReader::open(uri)?)
        } else if let Some(path) = uri.strip_prefix("file://") {
            Kind::File(FileReader::open(uri, path)?)
        } else if let Some(spec) = uri.strip_prefix("memory://") {
            Kind::Memory(MemoryReader::open(uri, spec)?)
        } else {
            tracing::error!(uri, "unknown protocol");
            return Err(ReaderError::UnknownScheme(uri.to_string()));
        };

        Ok(Self {
            kind,
            total_reads: Metric::default(),
            total_bytes_read: Metric::default(),
        })
    }

    /// Total bytes available from this source.
    pub fn size(&self) -> Result<u64, ReaderError> {
        match &self.kind {
            Kind::File(reader) => reader.size(),
            Kind::Http(reader) => reader.size(),
            Kind::Memory(reader) => Ok(reader.size()),
        }
    }

    /// Reads up to `size` bytes starting at `offset` into `buffer`.
    ///
    /// The returned count is smaller than `size` only when `offset + size`
    /// runs past the end of the source.
    pub fn read(
        &mut self,
        buffer: &mut [u8],
        offset: u64,
        size: usize,
    ) -> Result<usize, ReaderError> {
        if size == 0 {
            self.total_reads.increment();
            return Ok(0);
        }
        let count = match &mut self.kind {
            Kind::File(reader) => reader.read(buffer, offset, size)?,
            Kind::Http(reader) => reader.read(buffer, offset, size)?,
            Kind::Memory(reader) => reader.read(buffer, offset, size),
        };
        self.total_reads.increment();
        self.total_bytes_read.add(count as u64);
        Ok(count)
    }

    /// Retrieves every range in `ranges`, invoking `callback` once per
    /// contiguous returned chunk, in submission order.
    ///
    /// The callback receives the absolute `(begin, end)` offsets the chunk
    /// covers (inclusive) and the chunk bytes. HTTP sources fold the whole
    /// batch into a single ranged GET; local sources read the ranges one by
    /// one.
    pub fn read_batch<E, F>(
        &mut self,
        ranges: &[BatchRetrievalInfo],
        callback: F,
    ) -> Result<u64, E>
    where
        E: From<ReaderError>,
        F: FnMut(u64, u64, &[u8]) -> Result<(), E>,
    {
        if let Kind::Http(reader) = &mut self.kind {
            let count = reader.read_batch(ranges, callback)?;
            self.total_reads.increment();
            self.total_bytes_read.add(count);
            Ok(count)
        } else {
            self.read_batch_sequential(ranges, callback)
        }
    }

    fn read_batch_sequential<E, F>(
        &mut self,
        ranges: &[BatchRetrievalInfo],
        mut callback: F,
    ) -> Result<u64, E>
    where
        E: From<ReaderError>,
        F: FnMut(u64, u64, &[u8]) -> Result<(), E>,
    {
        let mut buffer = Vec::new();
        let mut count = 0u64;
        for range in ranges {
            let wanted = range.size_to_read as usize;
            buffer.resize(wanted, 0);
            let got = self.read(&mut buffer, range.source_begin_offset, wanted)?;
            if got < wanted {
                return Err(ReaderError::ShortRead {
                    offset: range.source_begin_offset,
                    wanted: range.size_to_read,
                    got: got as u64,
                }
                .into());
            }
            callback(
                range.source_begin_offset,
                range.source_begin_offset + range.size_to_read - 1,
                &buffer[..wanted],
            )?;
            count += range.size_to_read;
        }
        Ok(count)
    }

    /// Number of read operations issued so far.
    #[must_use]
    pub fn total_reads(&self) -> u64 {
        self.total_reads.value()
    }

    /// Number of bytes returned so far.
    #[must_use]
    pub fn total_bytes_read(&self) -> u64 {
        self.total_bytes_read.value()
    }
}

impl MetricContainer for Reader {
    fn accept(&self, visitor: &mut dyn MetricVisitor) {
        visitor.visit("total_reads", self.total_reads.value());
        visitor.visit("total_bytes_read", self.total_bytes_read.value());
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{MemoryReader, Reader, ReaderError};

    /// Shared contract for every reader variant: clamped reads, EOF
    /// behavior, and the read metrics.
    fn check_reader_contract(reader: &mut Reader, expected_size: u64) {
        assert_eq!(reader.size().unwrap(), expected_size);

        let mut buffer = [0u8; 1024];

        let count = reader.read(&mut buffer, 1, 3).unwrap();
        assert_eq!(&buffer[..count], b"123");

        let count = reader.read(&mut buffer, 8, 3).unwrap();
        assert_eq!(&buffer[..count], b"89");

        let count = reader.read(&mut buffer, 20, 5).unwrap();
        assert_eq!(count, 0);

        assert_eq!(reader.total_reads(), 3);
        assert_eq!(reader.total_bytes_read(), 5);
    }

    #[test]
    fn memory_reader_honors_contract() {
        let uri = MemoryReader::publish(&b"0123456789"[..]);
        let mut reader = Reader::create(&uri).unwrap();
        check_reader_contract(&mut reader, 10);
    }

    #[test]
    fn file_reader_honors_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"0123456789").unwrap();
        drop(file);

        let mut reader = Reader::create(&format!("file://{}", path.display())).unwrap();
        check_reader_contract(&mut reader, 10);
    }

    #[test]
    fn batched_reads_visit_ranges_in_order() {
        use super::BatchRetrievalInfo;

        let uri = MemoryReader::publish(&b"0123456789"[..]);
        let mut reader = Reader::create(&uri).unwrap();

        let ranges = [
            BatchRetrievalInfo {
                block_index: 0,
                source_begin_offset: 1,
                size_to_read: 3,
                offset_to_write_to: 0,
            },
            BatchRetrievalInfo {
                block_index: 1,
                source_begin_offset: 5,
                size_to_read: 3,
                offset_to_write_to: 3,
            },
        ];

        let mut seen = Vec::new();
        let count = reader
            .read_batch::<ReaderError, _>(&ranges, |begin, end, chunk| {
                seen.push((begin, end, chunk.to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 6);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (1, 3, b"123".to_vec()));
        assert_eq!(seen[1], (5, 7, b"567".to_vec()));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(matches!(
            Reader::create("foo://1234"),
            Err(ReaderError::UnknownScheme(_))
        ));
    }

    #[test]
    fn malformed_memory_uris_are_rejected() {
        for uri in ["memory://G:0", "memory://0:G", "memory://0+0"] {
            assert!(
                matches!(Reader::create(uri), Err(ReaderError::MalformedMemoryUri(_))),
                "{uri} should be rejected",
            );
        }
    }

    #[test]
    fn missing_file_is_rejected_at_creation() {
        assert!(matches!(
            Reader::create("file:///definitely/not/here"),
            Err(ReaderError::MissingFile { .. })
        ));
    }
}
