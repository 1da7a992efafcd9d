//! Parser for `multipart/byteranges` response bodies.
//!
//! A multi-range GET comes back as a sequence of parts, each introduced by
//! `--<boundary>`, carrying its own headers (notably `Content-Range: bytes
//! B-E/T`) and a raw data run of `E - B + 1` bytes. The closing boundary
//! ends with `--`. The parser walks the body with a three-state machine
//! (boundary, headers, data) and hands each data run to the caller exactly
//! once, in body order.

use crate::ReaderError;

/// Longest header line the parser will accumulate before giving up.
const MAX_HEADER_LINE: usize = 1024;

const CRLF: &[u8] = b"\r\n";
const DASH: &[u8] = b"--";

enum State {
    Boundary,
    Header,
    Data,
}

/// Extracts the `boundary` parameter of a `multipart/byteranges` content
/// type.
pub(crate) fn boundary_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let param = param.trim();
        let value = param
            .strip_prefix("boundary=")
            .or_else(|| param.strip_prefix("BOUNDARY="))?;
        Some(value.trim_matches('"').to_string())
    })
}

/// Parses the value of a `Content-Range`-style `bytes B-E/T` range and
/// returns `(B, E)`.
pub(crate) fn parse_bytes_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, _total) = rest.split_once('/')?;
    let (begin, end) = range.split_once('-')?;
    Some((begin.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Walks `body` and invokes `callback(begin, end, bytes)` for every part,
/// returning the total number of data bytes dispatched.
pub(crate) fn parse<E, F>(body: &[u8], boundary: &str, mut callback: F) -> Result<u64, E>
where
    E: From<ReaderError>,
    F: FnMut(u64, u64, &[u8]) -> Result<(), E>,
{
    let mut pos = 0usize;
    let mut begin = 0u64;
    let mut end = 0u64;
    let mut count = 0u64;
    let mut state = State::Boundary;

    loop {
        match state {
            State::Boundary => {
                let line = read_line(body, &mut pos, 2)?;
                if line == CRLF {
                    // Tolerate blank lines between parts.
                    continue;
                }
                if line != DASH {
                    return Err(ReaderError::Multipart("expected boundary marker").into());
                }
                expect_token(body, &mut pos, boundary.as_bytes())?;

                let line = read_line(body, &mut pos, 2)?;
                if line == DASH {
                    return Ok(count);
                }
                if line != CRLF {
                    return Err(ReaderError::Multipart("malformed boundary line").into());
                }
                state = State::Header;
            }
            State::Header => {
                let line = read_line(body, &mut pos, MAX_HEADER_LINE)?;
                if line == CRLF {
                    state = State::Data;
                } else if let Some((b, e)) = parse_content_range(line) {
                    begin = b;
                    end = e;
                }
            }
            State::Data => {
                let len = (end - begin + 1) as usize;
                let chunk = body
                    .get(pos..pos + len)
                    .ok_or(ReaderError::Multipart("truncated data run"))?;
                callback(begin, end, chunk)?;
                pos += len;
                count += len as u64;
                state = State::Boundary;
            }
        }
    }
}

/// Accumulates bytes until a CRLF terminator or `max` bytes, whichever
/// comes first, and returns the accumulated run (terminator included).
fn read_line<'a>(body: &'a [u8], pos: &mut usize, max: usize) -> Result<&'a [u8], ReaderError> {
    let start = *pos;
    let mut after_cr = false;

    while *pos - start < max {
        let byte = *body
            .get(*pos)
            .ok_or(ReaderError::Multipart("truncated body"))?;
        *pos += 1;

        if after_cr && byte == b'\n' {
            return Ok(&body[start..*pos]);
        }
        after_cr = byte == b'\r';
    }

    Ok(&body[start..*pos])
}

fn expect_token(body: &[u8], pos: &mut usize, token: &[u8]) -> Result<(), ReaderError> {
    let run = body
        .get(*pos..*pos + token.len())
        .ok_or(ReaderError::Multipart("truncated body"))?;
    if run != token {
        return Err(ReaderError::Multipart("boundary mismatch"));
    }
    *pos += token.len();
    Ok(())
}

fn parse_content_range(line: &[u8]) -> Option<(u64, u64)> {
    let text = std::str::from_utf8(line).ok()?;
    let text = text.strip_suffix("\r\n").unwrap_or(text);

    let name = "content-range:";
    if text.len() < name.len() || !text[..name.len()].eq_ignore_ascii_case(name) {
        return None;
    }
    parse_bytes_range(&text[name.len()..])
}
