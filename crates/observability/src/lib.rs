#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Progress reporting and lock-free counters for long-running commands.
//!
//! A command owns an [`Observable`] and calls
//! [`start_next_phase`](Observable::start_next_phase) /
//! [`advance_progress`](Observable::advance_progress) as it works. An
//! [`Observer`], when attached, runs the command on a worker thread and
//! samples the observable every 100 ms to render a progress line and to
//! snapshot per-phase byte/time totals. The handshake is deliberately
//! one-sided: the command spins until the observer acknowledges a phase
//! change, so every phase boundary is observed even when a phase finishes
//! between two samples.
//!
//! [`Metric`] is a relaxed atomic counter; commands expose their metrics
//! through [`MetricContainer`] so tests and tools can walk them by name.

mod metrics;
mod observable;
mod observer;

pub use metrics::{Metric, MetricContainer, MetricVisitor};
pub use observable::Observable;
pub use observer::Observer;
