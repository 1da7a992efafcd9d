#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` provides the two hashing primitives used by the delta
//! synchronization pipelines:
//!
//! - [`weak`] implements the additive 32-bit rolling checksum used to locate
//!   candidate block positions while sliding a window over the seed file.
//! - [`strong`] implements the 128-bit XXH3 content digest used to confirm
//!   candidates and to fingerprint whole files.
//!
//! # Design
//!
//! The weak checksum is the rsync-style pair of 16-bit accumulators `a`
//! (byte sum) and `b` (position-weighted byte sum), packed as
//! `(b << 16) | a`. Bytes are accumulated as *signed* 8-bit values; the
//! artifact format inherited this from the reference implementation and the
//! two conventions must never be mixed.
//!
//! The strong checksum wraps `xxhash-rust`'s XXH3/128 in a small value type
//! ([`StrongChecksum`]) plus a streaming builder
//! ([`StrongChecksumBuilder`]), so callers can hash either a block in one
//! shot or a file of any size incrementally.
//!
//! # Invariants
//!
//! - Rolling the weak checksum one byte at a time produces exactly the same
//!   value as recomputing it from scratch over the shifted window.
//! - Feeding a buffer to [`StrongChecksumBuilder`] in any split produces
//!   the same digest as a single [`StrongChecksum::compute`] call.
//!
//! # Examples
//!
//! ```
//! use checksums::{StrongChecksum, weak_checksum};
//!
//! assert_eq!(weak_checksum(b"0123456789"), 183_829_005);
//! assert_eq!(
//!     StrongChecksum::compute(b"0123456789").to_string(),
//!     "e353667619ec664b49655fc9692165fb",
//! );
//! ```

pub mod strong;
pub mod weak;

pub use strong::{StrongChecksum, StrongChecksumBuilder};
pub use weak::{weak_checksum, weak_checksum_roll};
