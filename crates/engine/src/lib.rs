#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! The two pipelines at the heart of the tool.
//!
//! [`PrepareCommand`] turns a source file into a `.kysync` metadata
//! artifact plus a compressed block payload. [`SyncCommand`] consumes both,
//! scans a locally available seed file with the rolling checksum, and
//! reconstructs the source by copying matched blocks from the seed and
//! fetching only the missing ones (possibly over ranged HTTP), then
//! verifies the result against the whole-source hash.
//!
//! Both commands expose an [`Observable`](observability::Observable) so a
//! progress observer can be attached, and report their counters through
//! [`MetricContainer`](observability::MetricContainer).

mod error;
mod prepare;
mod sync;

pub use error::EngineError;
pub use prepare::PrepareCommand;
pub use sync::{SyncCommand, SyncMetrics};
