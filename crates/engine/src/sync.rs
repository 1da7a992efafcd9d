//! Target reconstruction from an artifact, a payload, and a local seed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use checksums::{StrongChecksum, StrongChecksumBuilder, weak_checksum_roll};
use file_stream::FileStreamProvider;
use observability::{Metric, MetricContainer, MetricVisitor, Observable};
use parallelize::Chunk;
use readers::{BatchRetrievalInfo, Reader};

use crate::error::{EngineError, io_error};

/// Sentinel for "this block was not found in the seed".
const INVALID_OFFSET: i64 = -1;

/// Header prefix fetched from the metadata source before parsing.
const MAX_HEADER_PREFIX: u64 = 1024;

/// Read granularity of the final verification pass.
const VERIFY_BUFFER_SIZE: usize = 1024 * 1024;

/// Membership filter over the whole 32-bit weak checksum space.
///
/// One bit per possible checksum value, 512 MiB, allocated once per sync
/// run. Bits are set while reading the artifact and cleared after a
/// confirmed match so later occurrences of the same checksum skip the
/// strong-checksum work. Updates race benignly under relaxed ordering: the
/// filter only gates candidate verification, never correctness.
struct InterestSet {
    words: Box<[AtomicU64]>,
}

impl InterestSet {
    const WORDS: usize = 1 << 26;

    fn new() -> Self {
        let mut words = Vec::with_capacity(Self::WORDS);
        words.resize_with(Self::WORDS, AtomicU64::default);
        Self {
            words: words.into_boxed_slice(),
        }
    }

    fn insert(&self, wcs: u32) {
        self.words[(wcs >> 6) as usize].fetch_or(1 << (wcs & 63), Ordering::Relaxed);
    }

    fn remove(&self, wcs: u32) {
        self.words[(wcs >> 6) as usize].fetch_and(!(1 << (wcs & 63)), Ordering::Relaxed);
    }

    fn contains(&self, wcs: u32) -> bool {
        self.words[(wcs >> 6) as usize].load(Ordering::Relaxed) & (1 << (wcs & 63)) != 0
    }
}

/// Counters reported by the sync pipeline.
#[derive(Default)]
pub struct SyncMetrics {
    /// Seed windows whose weak checksum hit the interest filter.
    pub weak_checksum_matches: Metric,
    /// Weak hits whose strong checksum did not confirm.
    pub weak_checksum_false_positive: Metric,
    /// Weak hits confirmed by the strong checksum.
    pub strong_checksum_matches: Metric,
    /// Bytes copied from the seed during reconstruction.
    pub reused_bytes: Metric,
    /// Bytes fetched from the data source during reconstruction.
    pub downloaded_bytes: Metric,
    /// Bytes produced by decompressing fetched blocks.
    pub decompressed_bytes: Metric,
}

impl MetricContainer for SyncMetrics {
    fn accept(&self, visitor: &mut dyn MetricVisitor) {
        visitor.visit("weak_checksum_matches", self.weak_checksum_matches.value());
        visitor.visit(
            "weak_checksum_false_positive",
            self.weak_checksum_false_positive.value(),
        );
        visitor.visit(
            "strong_checksum_matches",
            self.strong_checksum_matches.value(),
        );
        visitor.visit("reused_bytes", self.reused_bytes.value());
        visitor.visit("downloaded_bytes", self.downloaded_bytes.value());
        visitor.visit("decompressed_bytes", self.decompressed_bytes.value());
    }
}

/// Reconstructs a target file from its artifact, its compressed payload,
/// and a similar local seed.
///
/// The run is four phases: parse the artifact, scan the seed with the
/// rolling checksum, reconstruct the target block by block, and verify the
/// result against the whole-source hash. The phase methods are public so
/// callers can drive the pipeline stepwise and inspect the intermediate
/// state.
pub struct SyncCommand {
    data_uri: String,
    metadata_uri: String,
    seed_uri: String,
    output_provider: FileStreamProvider,
    compression_disabled: bool,
    blocks_per_batch: usize,
    threads: usize,

    size: u64,
    block_size: u64,
    block_count: usize,
    hash: String,

    weak_checksums: Vec<u32>,
    strong_checksums: Vec<StrongChecksum>,
    compressed_sizes: Vec<u64>,
    compressed_file_offsets: Vec<u64>,
    max_compressed_size: u64,

    set: InterestSet,
    analysis: HashMap<u32, Vec<usize>>,
    seed_offsets: Vec<AtomicI64>,

    metrics: SyncMetrics,
    progress: Arc<Observable>,
}

impl SyncCommand {
    /// Binds the pipeline to its sources and the output path.
    pub fn new(
        data_uri: impl Into<String>,
        metadata_uri: impl Into<String>,
        seed_uri: impl Into<String>,
        output_path: impl Into<PathBuf>,
        compression_disabled: bool,
        blocks_per_batch: usize,
        threads: usize,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            data_uri: data_uri.into(),
            metadata_uri: metadata_uri.into(),
            seed_uri: seed_uri.into(),
            output_provider: FileStreamProvider::new(output_path.into())?,
            compression_disabled,
            blocks_per_batch,
            threads,
            size: 0,
            block_size: 0,
            block_count: 0,
            hash: String::new(),
            weak_checksums: Vec::new(),
            strong_checksums: Vec::new(),
            compressed_sizes: Vec::new(),
            compressed_file_offsets: Vec::new(),
            max_compressed_size: 0,
            set: InterestSet::new(),
            analysis: HashMap::new(),
            seed_offsets: Vec::new(),
            metrics: SyncMetrics::default(),
            progress: Arc::new(Observable::new("sync")),
        })
    }

    /// Progress state for observer attachment.
    #[must_use]
    pub fn observable(&self) -> Arc<Observable> {
        Arc::clone(&self.progress)
    }

    /// Pipeline counters.
    #[must_use]
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Per-block weak checksums from the artifact.
    #[must_use]
    pub fn weak_checksums(&self) -> &[u32] {
        &self.weak_checksums
    }

    /// Per-block strong checksums from the artifact.
    #[must_use]
    pub fn strong_checksums(&self) -> &[StrongChecksum] {
        &self.strong_checksums
    }

    /// Largest compressed frame in the payload; an upper bound for buffers
    /// holding any single retrieved block.
    #[must_use]
    pub fn max_compressed_size(&self) -> u64 {
        self.max_compressed_size
    }

    /// Seed offset discovered for every block, `None` where the block must
    /// be fetched from the source.
    #[must_use]
    pub fn seed_offsets(&self) -> Vec<Option<u64>> {
        self.seed_offsets
            .iter()
            .map(|offset| {
                let value = offset.load(Ordering::Relaxed);
                (value != INVALID_OFFSET).then_some(value as u64)
            })
            .collect()
    }

    /// Runs all four phases.
    pub fn run(&mut self) -> Result<(), EngineError> {
        self.read_metadata()?;
        self.analyze_seed()?;
        self.reconstruct_source()?;
        self.verify()?;
        self.progress.start_next_phase(0);
        Ok(())
    }

    /// Phase 1: parses the artifact and builds the lookup tables.
    pub fn read_metadata(&mut self) -> Result<(), EngineError> {
        let mut reader = Reader::create(&self.metadata_uri)?;
        let metadata_size = reader.size()?;
        self.progress.start_next_phase(metadata_size);
        tracing::info!(uri = %self.metadata_uri, "reading metadata");

        let prefix_len = metadata_size.min(MAX_HEADER_PREFIX) as usize;
        let mut prefix = vec![0u8; prefix_len];
        let got = reader.read(&mut prefix, 0, prefix_len)?;
        let (header, header_size) = metadata::read_header(&prefix[..got])?;

        self.size = from_i64(header.size)?;
        self.block_size = from_i64(header.block_size)?;
        if self.block_size == 0 {
            return Err(metadata::MetadataError::OutOfRange(0).into());
        }
        self.hash = header.hash;
        self.block_count = self.size.div_ceil(self.block_size) as usize;
        self.progress.advance_progress(header_size as u64);

        let mut offset = header_size as u64;
        let weak = self.read_array(&mut reader, offset, 4)?;
        offset += weak.len() as u64;
        self.weak_checksums = metadata::decode_weak_checksums(&weak)?;

        let strong = self.read_array(&mut reader, offset, metadata::STRONG_RECORD_LEN)?;
        offset += strong.len() as u64;
        self.strong_checksums = metadata::decode_strong_checksums(&strong)?;

        let csize = self.read_array(&mut reader, offset, 8)?;
        self.compressed_sizes = metadata::decode_compressed_sizes(&csize)?;

        self.compressed_file_offsets = Vec::with_capacity(self.block_count);
        let mut cursor = 0u64;
        for &compressed_size in &self.compressed_sizes {
            self.compressed_file_offsets.push(cursor);
            cursor += compressed_size;
        }
        self.max_compressed_size = self.compressed_sizes.iter().copied().max().unwrap_or(0);

        self.seed_offsets = (0..self.block_count)
            .map(|_| AtomicI64::new(INVALID_OFFSET))
            .collect();
        for (index, &wcs) in self.weak_checksums.iter().enumerate() {
            self.set.insert(wcs);
            self.analysis.entry(wcs).or_default().push(index);
        }

        Ok(())
    }

    fn read_array(
        &self,
        reader: &mut Reader,
        offset: u64,
        record_len: usize,
    ) -> Result<Vec<u8>, EngineError> {
        let size_to_read = self.block_count * record_len;
        let mut bytes = vec![0u8; size_to_read];
        let got = reader.read(&mut bytes, offset, size_to_read)?;
        if got != size_to_read {
            return Err(EngineError::ShortRead {
                offset,
                expected: size_to_read as u64,
                got: got as u64,
            });
        }
        self.progress.advance_progress(got as u64);
        Ok(bytes)
    }

    /// Phase 2: slides the rolling checksum over the seed and records where
    /// each block can be reused from.
    ///
    /// Chunks overlap by one block so windows straddling a chunk split are
    /// still seen. The interest filter and the per-block offsets are shared
    /// mutable state with relaxed atomics; whichever worker wins a race
    /// installed an offset whose strong checksum matched, so every
    /// interleaving is valid.
    pub fn analyze_seed(&self) -> Result<(), EngineError> {
        let seed_size = Reader::create(&self.seed_uri)?.size()?;
        self.progress.start_next_phase(seed_size);
        tracing::info!(uri = %self.seed_uri, seed_size, "analyzing seed data");

        let plan = parallelize::chunks(seed_size, self.block_size, self.block_size, self.threads);
        parallelize::run(&plan, |chunk| self.analyze_seed_chunk(chunk, seed_size))?;
        Ok(())
    }

    fn analyze_seed_chunk(&self, chunk: Chunk, seed_size: u64) -> Result<(), EngineError> {
        let block = self.block_size as usize;
        let mut reader = Reader::create(&self.seed_uri)?;

        // The scratch holds the previous window ahead of the incoming
        // block; the first window is the zero sentinel the rolling
        // function expects.
        let mut window_pair = vec![0u8; 2 * block];
        let mut running = 0u32;
        let mut warmup = self.block_size as i64 - 1;

        let mut offset = chunk.begin;
        while offset < chunk.end {
            window_pair.copy_within(block.., 0);
            let count = reader.read(&mut window_pair[block..], offset, block)?;
            window_pair[block + count..].fill(0);

            running = weak_checksum_roll(&window_pair, block, running, |delta, wcs| {
                warmup -= 1;
                if warmup >= 0 {
                    return;
                }

                let window_begin = offset as i64 + delta;
                if window_begin + self.block_size as i64 > seed_size as i64 {
                    return;
                }
                if !self.set.contains(wcs) {
                    return;
                }

                self.metrics.weak_checksum_matches.increment();

                let window_at = (block as i64 + delta) as usize;
                let digest = StrongChecksum::compute(&window_pair[window_at..window_at + block]);

                let mut confirmed = false;
                if let Some(indices) = self.analysis.get(&wcs) {
                    for &index in indices {
                        if self.strong_checksums[index] == digest {
                            self.seed_offsets[index].store(window_begin, Ordering::Relaxed);
                            confirmed = true;
                        }
                    }
                }

                if confirmed {
                    self.set.remove(wcs);
                    warmup = self.block_size as i64 - 1;
                    self.metrics.strong_checksum_matches.increment();
                } else {
                    self.metrics.weak_checksum_false_positive.increment();
                }
            });

            self.progress.advance_progress(self.block_size);
            offset += self.block_size;
        }

        Ok(())
    }

    /// Phase 3: writes the target, mixing seed copies with batched
    /// retrievals from the data source.
    pub fn reconstruct_source(&self) -> Result<(), EngineError> {
        self.progress.start_next_phase(self.size);
        tracing::info!(uri = %self.data_uri, "reconstructing target");

        self.output_provider.resize(self.size)?;
        let plan = parallelize::chunks(self.size, self.block_size, 0, self.threads);
        parallelize::run(&plan, |chunk| self.reconstruct_chunk(chunk))?;
        Ok(())
    }

    fn reconstruct_chunk(&self, chunk: Chunk) -> Result<(), EngineError> {
        let mut reconstructor = ChunkReconstructor::new(self, chunk.begin)?;

        let mut offset = chunk.begin;
        while offset < chunk.end {
            let index = (offset / self.block_size) as usize;
            let seed_offset = self.seed_offsets[index].load(Ordering::Relaxed);
            if seed_offset == INVALID_OFFSET {
                reconstructor.enqueue_block_retrieval(index, offset);
                reconstructor.flush_batch(false)?;
            } else {
                reconstructor.reconstruct_from_seed(index, seed_offset as u64)?;
            }
            offset += self.block_size;
        }

        reconstructor.flush_batch(true)?;
        Ok(())
    }

    /// Phase 4: re-reads the assembled output and compares its digest to
    /// the artifact header's.
    pub fn verify(&self) -> Result<(), EngineError> {
        self.progress.start_next_phase(self.size);
        tracing::info!("verifying target");

        let mut output = self.output_provider.create_stream()?;
        let mut builder = StrongChecksumBuilder::new();
        let mut buffer = vec![0u8; VERIFY_BUFFER_SIZE];
        loop {
            let count = output
                .read(&mut buffer)
                .map_err(|source| io_error(self.output_provider.path(), source))?;
            if count == 0 {
                break;
            }
            builder.update(&buffer[..count]);
            self.progress.advance_progress(count as u64);
        }

        let computed = builder.digest().to_string();
        if computed != self.hash {
            return Err(EngineError::HashMismatch {
                expected: self.hash.clone(),
                computed,
            });
        }
        Ok(())
    }

    fn validate_block_len(&self, index: usize, actual: u64) -> Result<(), EngineError> {
        let expected = if index + 1 < self.block_count || self.size % self.block_size == 0 {
            self.block_size
        } else {
            self.size % self.block_size
        };
        if actual == expected {
            Ok(())
        } else {
            Err(EngineError::BlockLength {
                index,
                expected,
                actual,
            })
        }
    }
}

impl MetricContainer for SyncCommand {
    fn accept(&self, visitor: &mut dyn MetricVisitor) {
        self.metrics.accept(visitor);
    }
}

/// Per-worker reconstruction state: private readers, a private output
/// handle, and the pending retrieval batch.
struct ChunkReconstructor<'a> {
    command: &'a SyncCommand,
    buffer: Vec<u8>,
    seed_reader: Reader,
    data_reader: Reader,
    output: File,
    cursor: u64,
    batch: Vec<BatchRetrievalInfo>,
}

impl<'a> ChunkReconstructor<'a> {
    fn new(command: &'a SyncCommand, start_offset: u64) -> Result<Self, EngineError> {
        Ok(Self {
            buffer: vec![0u8; command.block_size as usize],
            seed_reader: Reader::create(&command.seed_uri)?,
            data_reader: Reader::create(&command.data_uri)?,
            output: command.output_provider.create_stream()?,
            cursor: start_offset,
            batch: Vec::new(),
            command,
        })
    }

    fn reconstruct_from_seed(&mut self, index: usize, seed_offset: u64) -> Result<(), EngineError> {
        let block = self.command.block_size as usize;
        let count = self.seed_reader.read(&mut self.buffer, seed_offset, block)?;

        self.command.validate_block_len(index, count as u64)?;
        self.output
            .seek(SeekFrom::Start(self.cursor))
            .map_err(|source| io_error(self.command.output_provider.path(), source))?;
        self.output
            .write_all(&self.buffer[..count])
            .map_err(|source| io_error(self.command.output_provider.path(), source))?;
        self.cursor += count as u64;

        self.command.progress.advance_progress(count as u64);
        self.command.metrics.reused_bytes.add(count as u64);
        Ok(())
    }

    fn enqueue_block_retrieval(&mut self, index: usize, begin_offset: u64) {
        let command = self.command;
        let info = if command.compression_disabled {
            BatchRetrievalInfo {
                block_index: index,
                source_begin_offset: begin_offset,
                size_to_read: command.block_size.min(command.size - begin_offset),
                offset_to_write_to: self.cursor,
            }
        } else {
            BatchRetrievalInfo {
                block_index: index,
                source_begin_offset: command.compressed_file_offsets[index],
                size_to_read: command.compressed_sizes[index],
                offset_to_write_to: self.cursor,
            }
        };
        self.batch.push(info);

        // Reserve the output slot whether or not the block arrives in this
        // batch.
        self.cursor += command.block_size;
    }

    fn flush_batch(&mut self, force: bool) -> Result<(), EngineError> {
        let threshold = if force { 1 } else { self.command.blocks_per_batch };
        if self.batch.len() < threshold {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.batch);
        let Self {
            command,
            buffer,
            data_reader,
            output,
            ..
        } = self;
        let command: &SyncCommand = *command;

        let mut entry = 0usize;
        let count = data_reader.read_batch::<EngineError, _>(&batch, |begin, end, chunk| {
            // One returned chunk may satisfy several queued requests when
            // the server coalesces adjacent ranges.
            let chunk_len = end - begin + 1;
            let mut consumed = 0u64;
            while consumed < chunk_len {
                let info = batch.get(entry).ok_or(EngineError::MisalignedChunk {
                    offset: begin + consumed,
                    expected: 0,
                })?;
                if begin + consumed != info.source_begin_offset {
                    return Err(EngineError::MisalignedChunk {
                        offset: begin + consumed,
                        expected: info.source_begin_offset,
                    });
                }

                let piece = chunk
                    .get(consumed as usize..(consumed + info.size_to_read) as usize)
                    .ok_or(EngineError::ShortRead {
                        offset: info.source_begin_offset,
                        expected: info.size_to_read,
                        got: chunk_len - consumed,
                    })?;
                write_retrieved(command, output, buffer, piece, info)?;

                consumed += info.size_to_read;
                entry += 1;
            }
            Ok(())
        })?;

        command.metrics.downloaded_bytes.add(count);
        Ok(())
    }
}

/// Writes one retrieved block at its reserved output offset, decompressing
/// it first unless compression is disabled.
fn write_retrieved(
    command: &SyncCommand,
    output: &mut File,
    scratch: &mut [u8],
    piece: &[u8],
    info: &BatchRetrievalInfo,
) -> Result<(), EngineError> {
    output
        .seek(SeekFrom::Start(info.offset_to_write_to))
        .map_err(|source| io_error(command.output_provider.path(), source))?;

    if command.compression_disabled {
        command.validate_block_len(info.block_index, piece.len() as u64)?;
        output
            .write_all(piece)
            .map_err(|source| io_error(command.output_provider.path(), source))?;
        command.progress.advance_progress(piece.len() as u64);
    } else {
        let produced = compress::decompress_into(piece, scratch)?;
        command.metrics.decompressed_bytes.add(produced as u64);
        command.validate_block_len(info.block_index, produced as u64)?;
        output
            .write_all(&scratch[..produced])
            .map_err(|source| io_error(command.output_provider.path(), source))?;
        command.progress.advance_progress(produced as u64);
    }

    Ok(())
}

fn from_i64(value: i64) -> Result<u64, EngineError> {
    u64::try_from(value)
        .map_err(|_| metadata::MetadataError::OutOfRange(i128::from(value)).into())
}
