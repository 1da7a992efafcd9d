use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};

use crate::{BatchRetrievalInfo, ReaderError, multipart};

/// Ranged reads over an http(s) endpoint.
///
/// `size` issues a `HEAD` request; reads issue `GET`s with a `Range`
/// header. A batch of ranges becomes one request whose response is either a
/// single body (200, or 206 with `Content-Range`) or a
/// `multipart/byteranges` document, parsed part by part.
pub struct HttpReader {
    uri: String,
    client: Client,
}

impl HttpReader {
    pub(crate) fn open(uri: &str) -> Result<Self, ReaderError> {
        url::Url::parse(uri).map_err(|source| ReaderError::InvalidHttpUri {
            uri: uri.to_string(),
            source,
        })?;

        let client = Client::builder()
            .build()
            .map_err(|source| ReaderError::Http {
                uri: uri.to_string(),
                source,
            })?;

        Ok(Self {
            uri: uri.to_string(),
            client,
        })
    }

    pub(crate) fn size(&self) -> Result<u64, ReaderError> {
        let response = self
            .client
            .head(&self.uri)
            .send()
            .map_err(|source| self.transport(source))?;
        self.check_status(response.status())?;

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or(ReaderError::MissingHeader {
                uri: self.uri.clone(),
                header: "Content-Length",
            })
    }

    pub(crate) fn read(
        &mut self,
        buffer: &mut [u8],
        offset: u64,
        size: usize,
    ) -> Result<usize, ReaderError> {
        let ranges = [BatchRetrievalInfo {
            block_index: 0,
            source_begin_offset: offset,
            size_to_read: size as u64,
            offset_to_write_to: 0,
        }];

        // Copy only the overlap with the requested window; a server may
        // answer with a wider range (or the whole resource on a 200).
        let want_end = offset + size as u64;
        let mut copied = 0usize;
        self.read_batch::<ReaderError, _>(&ranges, |begin, _end, chunk| {
            let copy_begin = begin.max(offset);
            let copy_end = (begin + chunk.len() as u64).min(want_end);
            if copy_begin < copy_end {
                let source = &chunk[(copy_begin - begin) as usize..(copy_end - begin) as usize];
                buffer[(copy_begin - offset) as usize..(copy_end - offset) as usize]
                    .copy_from_slice(source);
                copied += source.len();
            }
            Ok(())
        })?;
        Ok(copied)
    }

    pub(crate) fn read_batch<E, F>(
        &mut self,
        ranges: &[BatchRetrievalInfo],
        mut callback: F,
    ) -> Result<u64, E>
    where
        E: From<ReaderError>,
        F: FnMut(u64, u64, &[u8]) -> Result<(), E>,
    {
        let header = ranges
            .iter()
            .map(|range| {
                format!(
                    "{}-{}",
                    range.source_begin_offset,
                    range.source_begin_offset + range.size_to_read - 1
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let response = self
            .client
            .get(&self.uri)
            .header(RANGE, format!("bytes={header}"))
            .send()
            .map_err(|source| self.transport(source))?;
        self.check_status(response.status())?;

        let content_type = header_text(&response, CONTENT_TYPE.as_str());
        let content_range = header_text(&response, CONTENT_RANGE.as_str());
        let body = response.bytes().map_err(|source| self.transport(source))?;

        if content_type
            .as_deref()
            .is_some_and(|value| value.starts_with("multipart/byteranges"))
        {
            let boundary = content_type
                .as_deref()
                .and_then(multipart::boundary_param)
                .ok_or(ReaderError::Multipart("missing boundary parameter"))?;
            return multipart::parse(&body, &boundary, callback);
        }

        if body.is_empty() {
            return Ok(0);
        }

        // Single-part response: a 206 declares which range came back, a
        // plain 200 is the whole resource from offset zero.
        let begin = content_range
            .as_deref()
            .and_then(multipart::parse_bytes_range)
            .map_or(0, |(begin, _)| begin);
        callback(begin, begin + body.len() as u64 - 1, &body)?;
        Ok(body.len() as u64)
    }

    fn check_status(&self, status: StatusCode) -> Result<(), ReaderError> {
        if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
            Ok(())
        } else {
            Err(ReaderError::HttpStatus {
                uri: self.uri.clone(),
                status: status.as_u16(),
            })
        }
    }

    fn transport(&self, source: reqwest::Error) -> ReaderError {
        ReaderError::Http {
            uri: self.uri.clone(),
            source,
        }
    }
}

fn header_text(response: &reqwest::blocking::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
