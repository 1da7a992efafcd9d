//! Minimal HTTP/1.1 file server for reader and sync tests.
//!
//! Serves `GET`/`HEAD` for files under a root directory and honors `Range`
//! headers: a single range yields a plain `206` with `Content-Range`, a
//! multi-range request yields `multipart/byteranges`, which is exactly the
//! surface the HTTP reader has to parse. One thread accepts, one short-lived
//! thread serves each connection; every response closes the connection.

use std::fs;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MULTIPART_BOUNDARY: &str = "46d1f9ab3c5b2e07";

/// A background HTTP server rooted at a local directory.
pub struct HttpFixtureServer {
    address: SocketAddr,
    shutdown: Arc<AtomicBool>,
    requests: Arc<AtomicU64>,
    accept_thread: Option<JoinHandle<()>>,
}

impl HttpFixtureServer {
    /// Binds an ephemeral localhost port and starts serving files under
    /// `root`.
    pub fn start(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let address = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(AtomicU64::new(0));

        let accept_thread = {
            let shutdown = Arc::clone(&shutdown);
            let requests = Arc::clone(&requests);
            thread::spawn(move || accept_loop(&listener, &root, &shutdown, &requests))
        };

        tracing::debug!(%address, "http fixture server listening");
        Ok(Self {
            address,
            shutdown,
            requests,
            accept_thread: Some(accept_thread),
        })
    }

    /// `http://` URI for `name` under the served root.
    #[must_use]
    pub fn uri_for(&self, name: &str) -> String {
        format!("http://{}/{name}", self.address)
    }

    /// Number of requests served so far.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl Drop for HttpFixtureServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(
    listener: &TcpListener,
    root: &Path,
    shutdown: &AtomicBool,
    requests: &Arc<AtomicU64>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let root = root.to_path_buf();
                let requests = Arc::clone(requests);
                thread::spawn(move || {
                    if let Err(error) = handle_connection(stream, &root, &requests) {
                        tracing::debug!("fixture connection ended: {error}");
                    }
                });
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => break,
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    root: &Path,
    requests: &AtomicU64,
) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;

    let head = read_request_head(&mut stream)?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let range_header = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("range"))
        .map(|(_, value)| value.trim().to_string());

    requests.fetch_add(1, Ordering::Relaxed);

    let relative = target.trim_start_matches('/');
    if relative.split('/').any(|part| part == "..") {
        return respond_status(&mut stream, "403 Forbidden");
    }

    let path = root.join(relative);
    let Ok(contents) = fs::read(&path) else {
        return respond_status(&mut stream, "404 Not Found");
    };

    match method.as_str() {
        "HEAD" => respond(
            &mut stream,
            "200 OK",
            &[("Content-Length", contents.len().to_string())],
            &[],
        ),
        "GET" => match range_header.as_deref().map(|h| parse_ranges(h, contents.len() as u64)) {
            None => respond(
                &mut stream,
                "200 OK",
                &[("Content-Length", contents.len().to_string())],
                &contents,
            ),
            Some(Some(ranges)) if !ranges.is_empty() => {
                respond_ranges(&mut stream, &contents, &ranges)
            }
            Some(_) => respond_status(&mut stream, "416 Range Not Satisfiable"),
        },
        _ => respond_status(&mut stream, "405 Method Not Allowed"),
    }
}

fn read_request_head(stream: &mut TcpStream) -> io::Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let count = stream.read(&mut byte)?;
        if count == 0 {
            break;
        }
        head.push(byte[0]);
        if head.len() > 16 * 1024 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "header too long"));
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

/// Parses `bytes=a-b, c-, -n` into inclusive `(begin, end)` pairs, clamped
/// to the resource length. Returns `None` for an unusable header.
fn parse_ranges(header: &str, len: u64) -> Option<Vec<(u64, u64)>> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let mut ranges = Vec::new();
    for item in spec.split(',') {
        let item = item.trim();
        let (begin, end) = item.split_once('-')?;
        let range = if begin.is_empty() {
            // Suffix form: the final `n` bytes.
            let suffix: u64 = end.parse().ok()?;
            (len.saturating_sub(suffix), len.checked_sub(1)?)
        } else {
            let begin: u64 = begin.parse().ok()?;
            let end = if end.is_empty() {
                len.checked_sub(1)?
            } else {
                end.parse::<u64>().ok()?.min(len.saturating_sub(1))
            };
            (begin, end)
        };
        if range.0 > range.1 || range.0 >= len {
            return None;
        }
        ranges.push(range);
    }
    Some(ranges)
}

fn respond_ranges(
    stream: &mut TcpStream,
    contents: &[u8],
    ranges: &[(u64, u64)],
) -> io::Result<()> {
    if let [(begin, end)] = ranges {
        let body = &contents[*begin as usize..=*end as usize];
        return respond(
            stream,
            "206 Partial Content",
            &[
                ("Content-Length", body.len().to_string()),
                (
                    "Content-Range",
                    format!("bytes {begin}-{end}/{}", contents.len()),
                ),
            ],
            body,
        );
    }

    let mut body = Vec::new();
    for &(begin, end) in ranges {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
        body.extend_from_slice(
            format!("Content-Range: bytes {begin}-{end}/{}\r\n\r\n", contents.len()).as_bytes(),
        );
        body.extend_from_slice(&contents[begin as usize..=end as usize]);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    respond(
        stream,
        "206 Partial Content",
        &[
            ("Content-Length", body.len().to_string()),
            (
                "Content-Type",
                format!("multipart/byteranges; boundary={MULTIPART_BOUNDARY}"),
            ),
        ],
        &body,
    )
}

fn respond_status(stream: &mut TcpStream, status: &str) -> io::Result<()> {
    respond(stream, status, &[("Content-Length", "0".to_string())], &[])
}

fn respond(
    stream: &mut TcpStream,
    status: &str,
    headers: &[(&str, String)],
    body: &[u8],
) -> io::Result<()> {
    let mut response = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("Connection: close\r\n\r\n");

    stream.write_all(response.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()
}
