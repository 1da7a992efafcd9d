use std::io::Write;

use prost::Message;

use crate::MetadataError;

/// The only artifact version this build reads or writes.
pub const SUPPORTED_VERSION: i32 = 2;

/// Leading record of the artifact, serialized as a length-delimited
/// protobuf message.
#[derive(Clone, PartialEq, Message)]
pub struct Header {
    /// Format revision; always [`SUPPORTED_VERSION`] for artifacts written
    /// by this build.
    #[prost(int32, tag = "1")]
    pub version: i32,
    /// Source file length in bytes.
    #[prost(int64, tag = "2")]
    pub size: i64,
    /// Block size the source was split with.
    #[prost(int64, tag = "3")]
    pub block_size: i64,
    /// Hex rendering of the whole-source strong checksum.
    #[prost(string, tag = "4")]
    pub hash: String,
}

/// Writes the length-delimited header and returns the number of bytes
/// emitted (varint delimiter included).
pub fn write_header(output: &mut impl Write, header: &Header) -> Result<u64, MetadataError> {
    let encoded = header.encode_length_delimited_to_vec();
    output.write_all(&encoded)?;
    Ok(encoded.len() as u64)
}

/// Decodes the header from the front of `buffer` and returns it together
/// with the number of bytes consumed, i.e. the offset where the packed
/// arrays begin.
///
/// Any version other than [`SUPPORTED_VERSION`] is rejected.
pub fn read_header(buffer: &[u8]) -> Result<(Header, usize), MetadataError> {
    let mut cursor = buffer;
    let record_len = prost::decode_length_delimiter(&mut cursor)?;
    if cursor.len() < record_len {
        return Err(MetadataError::TruncatedHeader);
    }

    let header = Header::decode(&cursor[..record_len])?;
    if header.version != SUPPORTED_VERSION {
        return Err(MetadataError::UnsupportedVersion(header.version));
    }

    let consumed = prost::length_delimiter_len(record_len) + record_len;
    Ok((header, consumed))
}

#[cfg(test)]
mod tests {
    use super::{Header, SUPPORTED_VERSION, read_header, write_header};
    use crate::MetadataError;

    fn sample_header() -> Header {
        Header {
            version: SUPPORTED_VERSION,
            size: 1_000_000,
            block_size: 1024,
            hash: "e353667619ec664b49655fc9692165fb".to_string(),
        }
    }

    #[test]
    fn round_trip_preserves_fields_and_length() {
        let mut buffer = Vec::new();
        let written = write_header(&mut buffer, &sample_header()).unwrap();
        assert_eq!(written as usize, buffer.len());

        // Readers always fetch a fixed-size prefix, so trailing bytes after
        // the record must be ignored.
        buffer.extend_from_slice(&[0xAA; 64]);

        let (header, consumed) = read_header(&buffer).unwrap();
        assert_eq!(consumed as u64, written);
        assert_eq!(header, sample_header());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut wrong = sample_header();
        wrong.version = 3;

        let mut buffer = Vec::new();
        write_header(&mut buffer, &wrong).unwrap();

        assert!(matches!(
            read_header(&buffer),
            Err(MetadataError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut buffer = Vec::new();
        write_header(&mut buffer, &sample_header()).unwrap();
        buffer.truncate(buffer.len() - 1);

        assert!(matches!(
            read_header(&buffer),
            Err(MetadataError::TruncatedHeader)
        ));
    }
}
