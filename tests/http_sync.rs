//! End-to-end coverage over http:// sources: the reader contract against a
//! live server, multipart/byteranges dispatch, and full sync runs fetching
//! metadata and blocks over HTTP.

use engine::{PrepareCommand, SyncCommand};
use readers::{BatchRetrievalInfo, Reader, ReaderError};
use test_support::{HttpFixtureServer, TestDir, read_file};

#[test]
fn http_reader_serves_sizes_and_ranged_reads() {
    let dir = TestDir::new().expect("create test dir");
    dir.write_file("test.data", b"0123456789").expect("write fixture");
    let server = HttpFixtureServer::start(dir.path()).expect("start server");

    let mut reader = Reader::create(&server.uri_for("test.data")).expect("create reader");
    assert_eq!(reader.size().expect("size"), 10);

    let mut buffer = [0u8; 16];
    let count = reader.read(&mut buffer, 1, 3).expect("read range");
    assert_eq!(&buffer[..count], b"123");

    let count = reader.read(&mut buffer, 8, 2).expect("read tail");
    assert_eq!(&buffer[..count], b"89");

    assert_eq!(reader.total_reads(), 2);
    assert_eq!(reader.total_bytes_read(), 5);
    assert!(server.requests() >= 3, "HEAD plus two GETs");
}

#[test]
fn three_range_batch_dispatches_three_chunks() {
    let dir = TestDir::new().expect("create test dir");
    dir.write_file("test.data", b"0123456789").expect("write fixture");
    let server = HttpFixtureServer::start(dir.path()).expect("start server");

    let mut reader = Reader::create(&server.uri_for("test.data")).expect("create reader");

    // Ranges (1,3), (5,7), (9,end): the server answers with
    // multipart/byteranges and each part must arrive as its own callback.
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
        BatchRetrievalInfo {
            block_index: 2,
            source_begin_offset: 9,
            size_to_read: 1,
            offset_to_write_to: 6,
        },
    ];

    let mut chunks = Vec::new();
    let count = reader
        .read_batch::<ReaderError, _>(&ranges, |begin, end, chunk| {
            chunks.push((begin, end, chunk.to_vec()));
            Ok(())
        })
        .expect("batched read");

    assert_eq!(count, 7);
    assert_eq!(
        chunks,
        vec![
            (1, 3, b"123".to_vec()),
            (5, 7, b"567".to_vec()),
            (9, 9, b"9".to_vec()),
        ]
    );
}

#[test]
fn sync_reconstructs_over_http() {
    let dir = TestDir::new().expect("create test dir");
    let (data_path, seed_path) = test_support::generate_pair(
        dir.path(),
        test_support::GenDataOptions {
            data_size: 200_000,
            seed_data_size: None,
            fragment_size: 9_999,
            similarity: 80,
            rng_seed: 7,
        },
    )
    .expect("generate corpus");

    let metadata_path = dir.join("data.bin.kysync");
    let compressed_path = dir.join("data.bin.pzst");
    PrepareCommand::new(&data_path, &metadata_path, &compressed_path, 1024, 4)
        .expect("create prepare command")
        .run()
        .expect("prepare should succeed");

    let server = HttpFixtureServer::start(dir.path()).expect("start server");
    let data = read_file(&data_path);

    // Compressed payload over HTTP.
    let output_path = dir.join("output.bin");
    let mut sync = SyncCommand::new(
        server.uri_for("data.bin.pzst"),
        server.uri_for("data.bin.kysync"),
        format!("file://{}", seed_path.display()),
        &output_path,
        false,
        4,
        4,
    )
    .expect("create sync command");
    sync.run().expect("sync over http should succeed");
    assert_eq!(read_file(&output_path), data);
    assert!(sync.metrics().downloaded_bytes.value() > 0);

    // Raw source over HTTP with compression disabled.
    let output_path = dir.join("output_raw.bin");
    let mut sync = SyncCommand::new(
        server.uri_for("data.bin"),
        server.uri_for("data.bin.kysync"),
        format!("file://{}", seed_path.display()),
        &output_path,
        true,
        4,
        4,
    )
    .expect("create sync command");
    sync.run().expect("uncompressed sync over http should succeed");
    assert_eq!(read_file(&output_path), data);
}
