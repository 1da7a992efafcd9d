//! crates/checksums/src/strong.rs
//!
//! 128-bit XXH3 content digests.
//!
//! The strong checksum confirms what the weak checksum only suggests: a
//! candidate block position found by the rolling scan is accepted only when
//! the 128-bit digests agree. XXH3/128 is not cryptographic, which is fine
//! here; the pipelines need speed and a collision probability that is
//! negligible for block counts in the billions.

use std::fmt;
use std::io::{self, Read};

use xxhash_rust::xxh3::{Xxh3, xxh3_128};

/// Read granularity used when digesting a whole stream.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// A 128-bit content digest split into two 64-bit halves.
///
/// Equality is bitwise. The canonical rendering is the 32-hex-digit
/// concatenation of the high and low halves, which is also the form stored
/// in the artifact header.
///
/// # Examples
///
/// ```
/// use checksums::StrongChecksum;
///
/// let digest = StrongChecksum::compute(b"0123456789");
/// assert_eq!(digest.to_string(), "e353667619ec664b49655fc9692165fb");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StrongChecksum {
    hi: u64,
    lo: u64,
}

impl StrongChecksum {
    /// Number of bytes in the serialized digest.
    pub const LEN: usize = 16;

    /// Reassembles a digest from its two halves.
    #[must_use]
    pub const fn from_parts(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// High 64 bits of the digest.
    #[must_use]
    pub const fn hi(self) -> u64 {
        self.hi
    }

    /// Low 64 bits of the digest.
    #[must_use]
    pub const fn lo(self) -> u64 {
        self.lo
    }

    /// Digests a buffer in one shot.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let digest = xxh3_128(data);
        Self {
            hi: (digest >> 64) as u64,
            lo: digest as u64,
        }
    }

    /// Digests everything remaining in `reader`, reading 64 KiB at a time.
    pub fn compute_reader(reader: &mut impl Read) -> io::Result<Self> {
        let mut builder = StrongChecksumBuilder::new();
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
        loop {
            let count = reader.read(&mut buffer)?;
            if count == 0 {
                return Ok(builder.digest());
            }
            builder.update(&buffer[..count]);
        }
    }

    /// Serializes the digest as the artifact's on-disk record: high half
    /// first, both halves little-endian.
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; Self::LEN] {
        let mut bytes = [0u8; Self::LEN];
        bytes[..8].copy_from_slice(&self.hi.to_le_bytes());
        bytes[8..].copy_from_slice(&self.lo.to_le_bytes());
        bytes
    }

    /// Inverse of [`Self::to_le_bytes`].
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; Self::LEN]) -> Self {
        let mut hi = [0u8; 8];
        let mut lo = [0u8; 8];
        hi.copy_from_slice(&bytes[..8]);
        lo.copy_from_slice(&bytes[8..]);
        Self {
            hi: u64::from_le_bytes(hi),
            lo: u64::from_le_bytes(lo),
        }
    }
}

impl fmt::Display for StrongChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// Streaming construction of a [`StrongChecksum`].
///
/// Multiple [`update`](Self::update) calls are equivalent to a single call
/// over the concatenated input.
pub struct StrongChecksumBuilder {
    state: Xxh3,
}

impl Default for StrongChecksumBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StrongChecksumBuilder {
    /// Creates a builder with an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Xxh3::new(),
        }
    }

    /// Feeds more bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Returns the digest of everything fed so far.
    ///
    /// The builder stays usable; further updates continue the same stream.
    #[must_use]
    pub fn digest(&self) -> StrongChecksum {
        let digest = self.state.digest128();
        StrongChecksum {
            hi: (digest >> 64) as u64,
            lo: digest as u64,
        }
    }
}
