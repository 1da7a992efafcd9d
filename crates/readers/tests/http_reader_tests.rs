//! HTTP reader behavior against a live server: sizes, single ranges,
//! open-ended ranges, batched multipart responses, and error statuses.

use readers::{BatchRetrievalInfo, Reader, ReaderError};
use test_support::{HttpFixtureServer, TestDir};

fn fixture(content: &[u8]) -> (TestDir, HttpFixtureServer) {
    let dir = TestDir::new().expect("create test dir");
    dir.write_file("test.data", content).expect("write fixture");
    let server = HttpFixtureServer::start(dir.path()).expect("start server");
    (dir, server)
}

#[test]
fn head_reports_content_length() {
    let (_dir, server) = fixture(b"0123456789");
    let reader = Reader::create(&server.uri_for("test.data")).expect("create reader");
    assert_eq!(reader.size().expect("size"), 10);
}

#[test]
fn single_range_reads_are_byte_exact() {
    let (_dir, server) = fixture(b"0123456789");
    let mut reader = Reader::create(&server.uri_for("test.data")).expect("create reader");

    let mut buffer = [0u8; 8];
    let count = reader.read(&mut buffer, 4, 4).expect("read");
    assert_eq!(&buffer[..count], b"4567");
}

#[test]
fn range_past_end_is_clamped_by_the_server() {
    let (_dir, server) = fixture(b"0123456789");
    let mut reader = Reader::create(&server.uri_for("test.data")).expect("create reader");

    let mut buffer = [0u8; 8];
    let count = reader.read(&mut buffer, 8, 8).expect("read");
    assert_eq!(&buffer[..count], b"89");
}

#[test]
fn batched_ranges_preserve_submission_order() {
    let (_dir, server) = fixture(b"abcdefghijklmnopqrstuvwxyz");
    let mut reader = Reader::create(&server.uri_for("test.data")).expect("create reader");

    let ranges = [
        BatchRetrievalInfo {
            block_index: 0,
            source_begin_offset: 0,
            size_to_read: 2,
            offset_to_write_to: 0,
        },
        BatchRetrievalInfo {
            block_index: 1,
            source_begin_offset: 10,
            size_to_read: 3,
            offset_to_write_to: 2,
        },
        BatchRetrievalInfo {
            block_index: 2,
            source_begin_offset: 24,
            size_to_read: 2,
            offset_to_write_to: 5,
        },
    ];

    let mut seen = Vec::new();
    let count = reader
        .read_batch::<ReaderError, _>(&ranges, |begin, end, chunk| {
            seen.push((begin, end, chunk.to_vec()));
            Ok(())
        })
        .expect("batched read");

    assert_eq!(count, 7);
    assert_eq!(
        seen,
        vec![
            (0, 1, b"ab".to_vec()),
            (10, 12, b"klm".to_vec()),
            (24, 25, b"yz".to_vec()),
        ]
    );

    // One request, one read: the whole batch traveled in a single GET.
    assert_eq!(reader.total_reads(), 1);
    assert_eq!(reader.total_bytes_read(), 7);
}

#[test]
fn missing_resource_reports_status() {
    let (_dir, server) = fixture(b"0123456789");
    let mut reader = Reader::create(&server.uri_for("no-such-file")).expect("create reader");

    let mut buffer = [0u8; 4];
    let error = reader.read(&mut buffer, 0, 4).expect_err("404 must fail");
    assert!(matches!(
        error,
        ReaderError::HttpStatus { status: 404, .. }
    ));
}
