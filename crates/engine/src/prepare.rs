//! Source preparation: per-block checksums plus the compressed payload.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use checksums::{StrongChecksum, StrongChecksumBuilder, weak_checksum};
use file_stream::FileStreamProvider;
use metadata::Header;
use observability::{Metric, MetricContainer, MetricVisitor, Observable};
use parallelize::Chunk;

use crate::error::{EngineError, io_error};

/// Builds the `.kysync` artifact and the compressed payload for a source
/// file.
///
/// The run has three phases:
///
/// 1. Parallel per-block encode: every worker reads its byte range in
///    block-sized pieces, records the weak and strong checksum of each
///    (zero-padded) block, and writes the compressed frame into a scratch
///    layout strided at the worst-case frame size so workers never touch
///    each other's slots.
/// 2. Compaction: the frames are re-emitted back to back while the source
///    is streamed through the whole-file strong checksum.
/// 3. Serialization: header and the three packed per-block arrays.
pub struct PrepareCommand {
    input_path: PathBuf,
    metadata_path: PathBuf,
    compressed_provider: FileStreamProvider,

    block_size: u64,
    max_compressed_block_size: u64,
    compression_level: i32,
    threads: usize,

    weak_checksums: Vec<u32>,
    strong_checksums: Vec<StrongChecksum>,
    compressed_sizes: Vec<u64>,

    compressed_bytes: Metric,
    progress: Arc<Observable>,
}

/// Per-chunk results handed back by a phase-1 worker.
struct ChunkOutput {
    first_block: usize,
    weak: Vec<u32>,
    strong: Vec<StrongChecksum>,
    csize: Vec<u64>,
}

impl PrepareCommand {
    /// Binds the pipeline to its input and output paths.
    pub fn new(
        input_path: impl Into<PathBuf>,
        metadata_path: impl Into<PathBuf>,
        compressed_path: impl Into<PathBuf>,
        block_size: u64,
        threads: usize,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            input_path: input_path.into(),
            metadata_path: metadata_path.into(),
            compressed_provider: FileStreamProvider::new(compressed_path.into())?,
            block_size,
            max_compressed_block_size: compress::compress_bound(block_size as usize) as u64,
            compression_level: compress::DEFAULT_LEVEL,
            threads,
            weak_checksums: Vec::new(),
            strong_checksums: Vec::new(),
            compressed_sizes: Vec::new(),
            compressed_bytes: Metric::default(),
            progress: Arc::new(Observable::new("prepare")),
        })
    }

    /// Progress state for observer attachment.
    #[must_use]
    pub fn observable(&self) -> Arc<Observable> {
        Arc::clone(&self.progress)
    }

    /// Per-block weak checksums, filled by [`run`](Self::run).
    #[must_use]
    pub fn weak_checksums(&self) -> &[u32] {
        &self.weak_checksums
    }

    /// Per-block strong checksums, filled by [`run`](Self::run).
    #[must_use]
    pub fn strong_checksums(&self) -> &[StrongChecksum] {
        &self.strong_checksums
    }

    /// Runs all three phases.
    pub fn run(&mut self) -> Result<(), EngineError> {
        let data_size = fs::metadata(&self.input_path)
            .map_err(|source| io_error(&self.input_path, source))?
            .len();
        let block_count = data_size.div_ceil(self.block_size) as usize;

        tracing::info!(
            input = %self.input_path.display(),
            data_size,
            block_size = self.block_size,
            "preparing"
        );

        self.progress.start_next_phase(data_size);
        let outputs = {
            let this = &*self;
            let plan = parallelize::chunks(data_size, this.block_size, 0, this.threads);
            parallelize::run(&plan, |chunk| this.prepare_chunk(chunk))?
        };

        self.weak_checksums = vec![0; block_count];
        self.strong_checksums = vec![StrongChecksum::default(); block_count];
        self.compressed_sizes = vec![0; block_count];
        for output in outputs {
            let at = output.first_block..output.first_block + output.weak.len();
            self.weak_checksums[at.clone()].copy_from_slice(&output.weak);
            self.strong_checksums[at.clone()].copy_from_slice(&output.strong);
            self.compressed_sizes[at].copy_from_slice(&output.csize);
        }

        let hash = self.compact_and_hash(data_size)?;
        self.write_metadata(data_size, &hash)?;

        self.progress.start_next_phase(0);
        Ok(())
    }

    /// Phase-1 worker: checksums and compresses the blocks of one chunk.
    fn prepare_chunk(&self, chunk: Chunk) -> Result<ChunkOutput, EngineError> {
        let block = self.block_size as usize;

        let mut input =
            File::open(&self.input_path).map_err(|source| io_error(&self.input_path, source))?;
        input
            .seek(SeekFrom::Start(chunk.begin))
            .map_err(|source| io_error(&self.input_path, source))?;
        let mut output = self.compressed_provider.create_stream()?;

        let mut buffer = vec![0u8; block];
        let mut compressed = vec![0u8; self.max_compressed_block_size as usize];

        let first_block = (chunk.begin / self.block_size) as usize;
        let mut result = ChunkOutput {
            first_block,
            weak: Vec::new(),
            strong: Vec::new(),
            csize: Vec::new(),
        };

        let mut block_index = first_block as u64;
        let mut offset = chunk.begin;
        while offset < chunk.end {
            let size_to_read = (chunk.end - offset).min(self.block_size) as usize;
            input
                .read_exact(&mut buffer[..size_to_read])
                .map_err(|source| io_error(&self.input_path, source))?;
            buffer[size_to_read..].fill(0);

            result.weak.push(weak_checksum(&buffer));
            result.strong.push(StrongChecksum::compute(&buffer));

            let frame_len = compress::compress_into(
                &buffer[..size_to_read],
                &mut compressed,
                self.compression_level,
            )?;
            output
                .seek(SeekFrom::Start(block_index * self.max_compressed_block_size))
                .map_err(|source| io_error(self.compressed_provider.path(), source))?;
            output
                .write_all(&compressed[..frame_len])
                .map_err(|source| io_error(self.compressed_provider.path(), source))?;

            result.csize.push(frame_len as u64);
            self.compressed_bytes.add(frame_len as u64);
            self.progress.advance_progress(size_to_read as u64);

            block_index += 1;
            offset += self.block_size;
        }

        Ok(result)
    }

    /// Phase 2: re-emits the frames back to back and hashes the source.
    fn compact_and_hash(&self, data_size: u64) -> Result<String, EngineError> {
        let compressed_total: u64 = self.compressed_sizes.iter().sum();
        self.progress.start_next_phase(data_size + 2 * compressed_total);
        tracing::info!(compressed_total, "compacting compressed blocks");

        let mut frames_in = self.compressed_provider.create_stream()?;
        let mut frames_out = self.compressed_provider.create_stream()?;
        let mut source =
            File::open(&self.input_path).map_err(|source| io_error(&self.input_path, source))?;

        let mut frame = vec![0u8; self.max_compressed_block_size as usize];
        let mut block = vec![0u8; self.block_size as usize];
        let mut hash = StrongChecksumBuilder::new();

        let payload_path = self.compressed_provider.path();
        let mut write_cursor = 0u64;
        let mut remaining = data_size;
        for (index, &csize) in self.compressed_sizes.iter().enumerate() {
            frames_in
                .seek(SeekFrom::Start(index as u64 * self.max_compressed_block_size))
                .map_err(|source| io_error(payload_path, source))?;
            frames_in
                .read_exact(&mut frame[..csize as usize])
                .map_err(|source| io_error(payload_path, source))?;
            frames_out
                .seek(SeekFrom::Start(write_cursor))
                .map_err(|source| io_error(payload_path, source))?;
            frames_out
                .write_all(&frame[..csize as usize])
                .map_err(|source| io_error(payload_path, source))?;
            write_cursor += csize;

            let piece = remaining.min(self.block_size) as usize;
            source
                .read_exact(&mut block[..piece])
                .map_err(|source| io_error(&self.input_path, source))?;
            hash.update(&block[..piece]);
            remaining -= piece as u64;

            self.progress.advance_progress(piece as u64 + 2 * csize);
        }

        self.compressed_provider.resize(write_cursor)?;
        Ok(hash.digest().to_string())
    }

    /// Phase 3: header followed by the packed weak, strong, and csize
    /// arrays.
    fn write_metadata(&self, data_size: u64, hash: &str) -> Result<(), EngineError> {
        self.progress.start_next_phase(1);

        let mut output = File::create(&self.metadata_path)
            .map_err(|source| io_error(&self.metadata_path, source))?;

        let header = Header {
            version: metadata::SUPPORTED_VERSION,
            size: to_i64(data_size)?,
            block_size: to_i64(self.block_size)?,
            hash: hash.to_string(),
        };
        let header_len = metadata::write_header(&mut output, &header)?;
        self.progress.advance_progress(header_len);

        for bytes in [
            metadata::encode_weak_checksums(&self.weak_checksums),
            metadata::encode_strong_checksums(&self.strong_checksums),
            metadata::encode_compressed_sizes(&self.compressed_sizes)?,
        ] {
            output
                .write_all(&bytes)
                .map_err(|source| io_error(&self.metadata_path, source))?;
            self.progress.advance_progress(bytes.len() as u64);
        }

        Ok(())
    }
}

impl MetricContainer for PrepareCommand {
    fn accept(&self, visitor: &mut dyn MetricVisitor) {
        visitor.visit("compressed_bytes", self.compressed_bytes.value());
    }
}

fn to_i64(value: u64) -> Result<i64, EngineError> {
    i64::try_from(value)
        .map_err(|_| metadata::MetadataError::OutOfRange(i128::from(value)).into())
}
