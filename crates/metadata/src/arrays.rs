use checksums::StrongChecksum;

use crate::MetadataError;

/// Byte width of one strong-checksum record.
pub const STRONG_RECORD_LEN: usize = StrongChecksum::LEN;

/// Packs weak checksums as little-endian `u32`s.
#[must_use]
pub fn encode_weak_checksums(values: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Inverse of [`encode_weak_checksums`].
pub fn decode_weak_checksums(bytes: &[u8]) -> Result<Vec<u32>, MetadataError> {
    records(bytes, 4)?
        .map(|record| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(record);
            Ok(u32::from_le_bytes(raw))
        })
        .collect()
}

/// Packs strong checksums as 16-byte `(hi, lo)` little-endian records.
#[must_use]
pub fn encode_strong_checksums(values: &[StrongChecksum]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * STRONG_RECORD_LEN);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Inverse of [`encode_strong_checksums`].
pub fn decode_strong_checksums(bytes: &[u8]) -> Result<Vec<StrongChecksum>, MetadataError> {
    records(bytes, STRONG_RECORD_LEN)?
        .map(|record| {
            let mut raw = [0u8; STRONG_RECORD_LEN];
            raw.copy_from_slice(record);
            Ok(StrongChecksum::from_le_bytes(raw))
        })
        .collect()
}

/// Packs compressed block sizes as little-endian `i64`s.
///
/// Sizes are stored signed for wire compatibility; none of them is ever
/// negative in a valid artifact.
pub fn encode_compressed_sizes(values: &[u64]) -> Result<Vec<u8>, MetadataError> {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for &value in values {
        let signed = i64::try_from(value)
            .map_err(|_| MetadataError::OutOfRange(i128::from(value)))?;
        bytes.extend_from_slice(&signed.to_le_bytes());
    }
    Ok(bytes)
}

/// Inverse of [`encode_compressed_sizes`]; rejects negative sizes.
pub fn decode_compressed_sizes(bytes: &[u8]) -> Result<Vec<u64>, MetadataError> {
    records(bytes, 8)?
        .map(|record| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(record);
            let signed = i64::from_le_bytes(raw);
            u64::try_from(signed).map_err(|_| MetadataError::OutOfRange(i128::from(signed)))
        })
        .collect()
}

fn records(
    bytes: &[u8],
    record_len: usize,
) -> Result<impl Iterator<Item = &[u8]>, MetadataError> {
    if bytes.len() % record_len != 0 {
        return Err(MetadataError::MisalignedArray {
            actual: bytes.len(),
            record_len,
        });
    }
    Ok(bytes.chunks_exact(record_len))
}
