#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Splits a byte range into per-worker chunks and drives the workers.
//!
//! Both pipelines process a file as `ceil(size / block_size)` fixed-size
//! blocks. [`chunks`] assigns a contiguous run of whole blocks to each
//! worker; [`run`] executes one worker per chunk on its own OS thread and
//! collects the results in chunk order. The optional `overlap` extends each
//! chunk past its nominal end so that a rolling-window scan can warm up over
//! the bytes the previous chunk already covered; block boundaries that
//! straddle a chunk split are then still discoverable.

use std::thread;

/// A worker's assignment: the half-open byte interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Worker index, dense from zero.
    pub id: usize,
    /// First byte of the assignment.
    pub begin: u64,
    /// One past the last byte of the assignment (overlap included).
    pub end: u64,
}

/// Partitions `data_size` bytes into at most `threads` chunks of whole
/// blocks.
///
/// When the division would leave fewer than two blocks per chunk the split
/// collapses to a single worker; thread startup would cost more than it
/// buys. Empty chunks are dropped, so an empty input yields no chunks at
/// all.
#[must_use]
pub fn chunks(data_size: u64, block_size: u64, overlap: u64, threads: usize) -> Vec<Chunk> {
    let blocks = data_size.div_ceil(block_size);
    let mut workers = threads.max(1) as u64;
    let mut chunk_blocks = blocks.div_ceil(workers);

    if chunk_blocks < 2 {
        tracing::debug!(data_size, "input too small, collapsing to one worker");
        workers = 1;
        chunk_blocks = blocks;
    }

    tracing::debug!(data_size, block_size, workers, chunk_blocks, "chunk layout");

    (0..workers)
        .filter_map(|id| {
            let begin = id * chunk_blocks * block_size;
            let end = ((id + 1) * chunk_blocks * block_size + overlap).min(data_size);
            (begin < end).then_some(Chunk {
                id: id as usize,
                begin,
                end,
            })
        })
        .collect()
}

/// Runs `worker` once per chunk, each invocation on its own scoped thread,
/// and waits for all of them.
///
/// Results come back in chunk order. If several workers fail, the error of
/// the earliest chunk wins; all threads are joined either way.
pub fn run<T, E, F>(chunks: &[Chunk], worker: F) -> Result<Vec<T>, E>
where
    F: Fn(Chunk) -> Result<T, E> + Sync,
    T: Send,
    E: Send,
{
    let worker = &worker;
    thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .iter()
            .map(|&chunk| scope.spawn(move || worker(chunk)))
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}

/// Convenience wrapper: [`chunks`] followed by [`run`].
pub fn parallelize<T, E, F>(
    data_size: u64,
    block_size: u64,
    overlap: u64,
    threads: usize,
    worker: F,
) -> Result<Vec<T>, E>
where
    F: Fn(Chunk) -> Result<T, E> + Sync,
    T: Send,
    E: Send,
{
    run(&chunks(data_size, block_size, overlap, threads), worker)
}
