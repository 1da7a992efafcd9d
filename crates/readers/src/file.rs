use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::ReaderError;

/// Positioned reads over a local file.
pub struct FileReader {
    path: PathBuf,
    file: File,
}

impl FileReader {
    pub(crate) fn open(uri: &str, path: &str) -> Result<Self, ReaderError> {
        let path = Path::new(path);
        if !path.exists() {
            tracing::error!(%uri, "path not found");
            return Err(ReaderError::MissingFile {
                uri: uri.to_string(),
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path).map_err(|source| ReaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub(crate) fn size(&self) -> Result<u64, ReaderError> {
        self.file
            .metadata()
            .map(|metadata| metadata.len())
            .map_err(|source| self.error(source))
    }

    pub(crate) fn read(
        &mut self,
        buffer: &mut [u8],
        offset: u64,
        size: usize,
    ) -> Result<usize, ReaderError> {
        let file_size = self.size()?;
        if offset >= file_size {
            return Ok(0);
        }
        let wanted = size.min((file_size - offset) as usize);

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| self.error(source))?;
        self.file
            .read_exact(&mut buffer[..wanted])
            .map_err(|source| self.error(source))?;
        Ok(wanted)
    }

    fn error(&self, source: std::io::Error) -> ReaderError {
        ReaderError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
