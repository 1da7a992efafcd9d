use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::ReaderError;

/// Buffers visible to `memory://` URIs, keyed by their address.
static PUBLISHED: OnceLock<Mutex<HashMap<u64, Arc<[u8]>>>> = OnceLock::new();

fn published() -> &'static Mutex<HashMap<u64, Arc<[u8]>>> {
    PUBLISHED.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Reads from an in-process buffer. Useful for tests only.
///
/// A buffer becomes addressable by [publishing](Self::publish) it, which
/// hands back a `memory://<hex-address>:<hex-size>` URI. Published buffers
/// stay alive for the rest of the process.
pub struct MemoryReader {
    data: Arc<[u8]>,
    size: u64,
}

impl MemoryReader {
    /// Registers `data` and returns the URI under which
    /// [`Reader::create`](crate::Reader::create) will find it.
    pub fn publish(data: impl Into<Arc<[u8]>>) -> String {
        let data: Arc<[u8]> = data.into();
        let address = data.as_ptr() as u64;
        let size = data.len();
        published()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(address, data);
        format!("memory://{address:x}:{size:x}")
    }

    pub(crate) fn open(uri: &str, spec: &str) -> Result<Self, ReaderError> {
        let malformed = || ReaderError::MalformedMemoryUri(uri.to_string());

        let (address, size) = spec.split_once(':').ok_or_else(malformed)?;
        let address = u64::from_str_radix(address, 16).map_err(|_| malformed())?;
        let size = u64::from_str_radix(size, 16).map_err(|_| malformed())?;

        let data = published()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&address)
            .cloned()
            .ok_or_else(|| ReaderError::UnpublishedBuffer(uri.to_string()))?;

        if size > data.len() as u64 {
            return Err(ReaderError::MemorySizeMismatch {
                uri: uri.to_string(),
                declared: size,
                actual: data.len() as u64,
            });
        }

        Ok(Self { data, size })
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn read(&self, buffer: &mut [u8], offset: u64, size: usize) -> usize {
        let limit = self.size.min(offset + size as u64);
        if offset >= limit {
            return 0;
        }
        let count = (limit - offset) as usize;
        buffer[..count].copy_from_slice(&self.data[offset as usize..offset as usize + count]);
        count
    }
}
