//! End-to-end coverage of the prepare and sync pipelines over `file://`
//! sources: checksum arrays, metadata round-trips, seed reuse scenarios,
//! and the reuse/download accounting.

use std::path::PathBuf;
use std::sync::Mutex;

use checksums::{StrongChecksum, weak_checksum};
use engine::{PrepareCommand, SyncCommand};
use test_support::{TestDir, assert_metrics, read_file};

/// Sync runs allocate the full checksum interest filter, so the heavier
/// tests take turns instead of piling up allocations.
static SYNC_LOCK: Mutex<()> = Mutex::new(());

fn lock_sync() -> std::sync::MutexGuard<'static, ()> {
    SYNC_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

struct Prepared {
    dir: TestDir,
    data_path: PathBuf,
    metadata_path: PathBuf,
    compressed_path: PathBuf,
}

fn prepare(data: &[u8], block_size: u64, threads: usize) -> (Prepared, PrepareCommand) {
    let dir = TestDir::new().expect("create test dir");
    let data_path = dir.write_file("data.bin", data).expect("write data");
    let metadata_path = dir.join("data.bin.kysync");
    let compressed_path = dir.join("data.bin.pzst");

    let mut command = PrepareCommand::new(
        &data_path,
        &metadata_path,
        &compressed_path,
        block_size,
        threads,
    )
    .expect("create prepare command");
    command.run().expect("prepare should succeed");

    (
        Prepared {
            dir,
            data_path,
            metadata_path,
            compressed_path,
        },
        command,
    )
}

fn file_uri(path: &PathBuf) -> String {
    format!("file://{}", path.display())
}

fn sync_command(
    prepared: &Prepared,
    seed_path: &PathBuf,
    compression_disabled: bool,
    threads: usize,
) -> SyncCommand {
    let data_path = if compression_disabled {
        &prepared.data_path
    } else {
        &prepared.compressed_path
    };
    SyncCommand::new(
        file_uri(data_path),
        file_uri(&prepared.metadata_path),
        file_uri(seed_path),
        prepared.dir.join("output.bin"),
        compression_disabled,
        4,
        threads,
    )
    .expect("create sync command")
}

#[test]
fn prepare_records_padded_block_checksums() {
    let (_prepared, command) = prepare(b"0123456789", 4, 1);

    assert_eq!(
        command.weak_checksums(),
        [
            weak_checksum(b"0123"),
            weak_checksum(b"4567"),
            weak_checksum(b"89\0\0"),
        ]
    );
    assert_eq!(
        command.strong_checksums(),
        [
            StrongChecksum::compute(b"0123"),
            StrongChecksum::compute(b"4567"),
            StrongChecksum::compute(b"89\0\0"),
        ]
    );
}

#[test]
fn prepare_records_repeated_blocks_identically() {
    let (_prepared, command) = prepare(b"123412341234", 4, 1);

    let expected_weak = weak_checksum(b"1234");
    let expected_strong = StrongChecksum::compute(b"1234");
    assert_eq!(command.weak_checksums(), [expected_weak; 3]);
    assert_eq!(command.strong_checksums(), [expected_strong; 3]);
}

#[test]
fn prepare_is_deterministic_across_thread_counts() {
    let data: Vec<u8> = (0u8..=255).cycle().take(64 * 1024 + 377).collect();

    let (_p1, single) = prepare(&data, 1024, 1);
    let (_p2, parallel) = prepare(&data, 1024, 8);

    assert_eq!(single.weak_checksums(), parallel.weak_checksums());
    assert_eq!(single.strong_checksums(), parallel.strong_checksums());
}

#[test]
fn metadata_round_trips_through_sync() {
    let _guard = lock_sync();
    let (prepared, prepare_command) = prepare(b"0123456789", 4, 1);

    let mut sync = sync_command(&prepared, &prepared.data_path, true, 1);
    sync.read_metadata().expect("read metadata");

    assert_eq!(sync.weak_checksums(), prepare_command.weak_checksums());
    assert_eq!(sync.strong_checksums(), prepare_command.strong_checksums());
}

fn end_to_end(
    data: &[u8],
    seed: &[u8],
    compression_disabled: bool,
    block_size: u64,
    expected_seed_offsets: &[Option<u64>],
) {
    let (prepared, _) = prepare(data, block_size, 1);
    let seed_path = prepared.dir.write_file("seed.bin", seed).expect("write seed");

    let mut sync = sync_command(&prepared, &seed_path, compression_disabled, 1);
    sync.run().expect("sync should succeed");

    assert_eq!(
        sync.seed_offsets(),
        expected_seed_offsets,
        "seed offsets for data={:?} seed={:?}",
        String::from_utf8_lossy(&data[..data.len().min(40)]),
        String::from_utf8_lossy(&seed[..seed.len().min(40)]),
    );
    assert_eq!(read_file(&prepared.dir.join("output.bin")), data);
}

fn run_end_to_end_scenarios(compression_disabled: bool) {
    const NONE: Option<u64> = None;

    end_to_end(b"", b"", compression_disabled, 4, &[]);
    end_to_end(
        b"0123456789",
        b"0123456789",
        compression_disabled,
        4,
        &[Some(0), Some(4), NONE],
    );
    end_to_end(
        b"0123456789",
        b"0123456789",
        compression_disabled,
        6,
        &[Some(0), NONE],
    );
    end_to_end(
        b"0123456789",
        b"001234004567",
        compression_disabled,
        4,
        &[Some(1), Some(8), NONE],
    );
    end_to_end(
        b"123412341234",
        b"00123400",
        compression_disabled,
        4,
        &[Some(2), Some(2), Some(2)],
    );
    end_to_end(b"12345678", b"", compression_disabled, 4, &[NONE, NONE]);
    end_to_end(
        b"abcdefjhijklmnopqrstuvwxyz",
        b"_qrst_mnop_ijkl_abcd_efjh_uvwx_yz",
        compression_disabled,
        4,
        &[Some(16), Some(21), Some(11), Some(6), Some(1), Some(26), NONE],
    );
    end_to_end(
        b"1234234534564567567867897890",
        b"1234567890",
        compression_disabled,
        4,
        &[Some(0), NONE, NONE, NONE, Some(4), NONE, NONE],
    );

    // Every block of the target is the same; one seed occurrence must
    // serve all of them.
    let repeated: Vec<u8> = b"1234".repeat(1024);
    end_to_end(
        &repeated,
        b"1234",
        compression_disabled,
        4,
        &vec![Some(0); 1024],
    );
}

#[test]
fn end_to_end_scenarios_with_compression() {
    let _guard = lock_sync();
    run_end_to_end_scenarios(false);
}

#[test]
fn end_to_end_scenarios_without_compression() {
    let _guard = lock_sync();
    run_end_to_end_scenarios(true);
}

#[test]
fn identical_seed_reuses_every_block() {
    let _guard = lock_sync();

    let data: Vec<u8> = (0u8..=255).cycle().take(16 * 1024).collect();
    let (prepared, _) = prepare(&data, 1024, 1);

    let mut sync = sync_command(&prepared, &prepared.data_path, true, 1);
    sync.run().expect("sync should succeed");

    assert_eq!(read_file(&prepared.dir.join("output.bin")), data);
    assert_metrics(
        sync.metrics(),
        &[
            ("reused_bytes", data.len() as u64),
            ("downloaded_bytes", 0),
            ("decompressed_bytes", 0),
        ],
    );
}

#[test]
fn empty_seed_downloads_every_block() {
    let _guard = lock_sync();

    let data: Vec<u8> = (0u8..=255).cycle().take(8 * 1024).collect();

    // Compression disabled: the download is exactly the source bytes.
    let (prepared, _) = prepare(&data, 1024, 1);
    let seed_path = prepared.dir.write_file("seed.bin", b"").expect("write seed");
    let mut sync = sync_command(&prepared, &seed_path, true, 1);
    sync.run().expect("sync should succeed");
    assert_eq!(read_file(&prepared.dir.join("output.bin")), data);
    assert_metrics(
        sync.metrics(),
        &[("reused_bytes", 0), ("downloaded_bytes", data.len() as u64)],
    );

    // Compression enabled: the download is exactly the compacted payload.
    let (prepared, _) = prepare(&data, 1024, 1);
    let seed_path = prepared.dir.write_file("seed.bin", b"").expect("write seed");
    let payload_size = std::fs::metadata(&prepared.compressed_path)
        .expect("payload exists")
        .len();
    let mut sync = sync_command(&prepared, &seed_path, false, 1);
    sync.run().expect("sync should succeed");
    assert_eq!(read_file(&prepared.dir.join("output.bin")), data);
    assert_metrics(
        sync.metrics(),
        &[
            ("reused_bytes", 0),
            ("downloaded_bytes", payload_size),
            ("decompressed_bytes", data.len() as u64),
        ],
    );
}

#[test]
fn similar_generated_files_sync_in_parallel() {
    let _guard = lock_sync();

    let dir = TestDir::new().expect("create test dir");
    let (data_path, seed_path) = test_support::generate_pair(
        dir.path(),
        test_support::GenDataOptions {
            data_size: 1_000_000,
            seed_data_size: None,
            fragment_size: 12_345,
            similarity: 90,
            rng_seed: 42,
        },
    )
    .expect("generate corpus");

    let metadata_path = dir.join("data.bin.kysync");
    let compressed_path = dir.join("data.bin.pzst");
    PrepareCommand::new(&data_path, &metadata_path, &compressed_path, 1024, 8)
        .expect("create prepare command")
        .run()
        .expect("prepare should succeed");

    let output_path = dir.join("output.bin");
    let mut sync = SyncCommand::new(
        format!("file://{}", compressed_path.display()),
        format!("file://{}", metadata_path.display()),
        format!("file://{}", seed_path.display()),
        &output_path,
        false,
        4,
        8,
    )
    .expect("create sync command");
    sync.run().expect("sync should succeed");

    assert_eq!(read_file(&output_path), read_file(&data_path));
    assert!(
        sync.metrics().reused_bytes.value() > 0,
        "a 90% similar seed should contribute blocks"
    );
    assert!(
        sync.metrics().downloaded_bytes.value() > 0,
        "diverged fragments must come from the source"
    );

    // Every recorded seed offset must point at bytes that hash to the
    // block's strong checksum.
    let seed = read_file(&seed_path);
    for (index, offset) in sync.seed_offsets().into_iter().enumerate() {
        if let Some(offset) = offset {
            let window = &seed[offset as usize..offset as usize + 1024];
            assert_eq!(
                StrongChecksum::compute(window),
                sync.strong_checksums()[index],
                "block {index} mapped to seed offset {offset}"
            );
        }
    }
}

#[test]
fn corrupted_data_source_fails_hash_verification() {
    let _guard = lock_sync();

    let data: Vec<u8> = (0u8..=255).cycle().take(4 * 1024).collect();
    let (prepared, _) = prepare(&data, 1024, 1);
    let seed_path = prepared.dir.write_file("seed.bin", b"").expect("write seed");

    // Flip one byte of the raw source; with compression disabled the bad
    // block is copied verbatim and only the final hash can catch it.
    let mut corrupt = read_file(&prepared.data_path);
    corrupt[2048] ^= 0xff;
    std::fs::write(&prepared.data_path, &corrupt).expect("corrupt source");

    let mut sync = sync_command(&prepared, &seed_path, true, 1);
    let error = sync.run().expect_err("corruption must not verify");
    assert!(
        error.to_string().contains("hash mismatch"),
        "unexpected failure: {error}"
    );
}

#[test]
fn corrupted_payload_frame_fails_decompression() {
    let _guard = lock_sync();

    let data: Vec<u8> = (0u8..=255).cycle().take(4 * 1024).collect();
    let (prepared, _) = prepare(&data, 1024, 1);
    let seed_path = prepared.dir.write_file("seed.bin", b"").expect("write seed");

    // Truncate the zstd magic of the first frame.
    let mut payload = read_file(&prepared.compressed_path);
    payload[0] ^= 0xff;
    std::fs::write(&prepared.compressed_path, &payload).expect("corrupt payload");

    let mut sync = sync_command(&prepared, &seed_path, false, 1);
    assert!(sync.run().is_err(), "a broken frame must abort the run");
}

#[test]
fn corrupted_artifact_version_fails_loudly() {
    let _guard = lock_sync();

    let (prepared, _) = prepare(b"0123456789", 4, 1);

    // The version lives in the first header field; bump it.
    let mut artifact = read_file(&prepared.metadata_path);
    // varint length prefix, then field 1 tag and the version value.
    assert_eq!(artifact[1], 0x08, "header should start with the version field");
    artifact[2] = 3;
    std::fs::write(&prepared.metadata_path, &artifact).expect("rewrite artifact");

    let mut sync = sync_command(&prepared, &prepared.data_path, true, 1);
    let error = sync.read_metadata().expect_err("version 3 must be rejected");
    assert!(error.to_string().contains("unsupported artifact version"));
}
