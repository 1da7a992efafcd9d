#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Hands out independent read/write handles to one shared file.
//!
//! Worker threads writing disjoint regions of the same output each need
//! their own file handle positioned at their own offset. Opening with
//! truncation in each worker would race and blank the file, so the provider
//! creates the file exactly once and every subsequent open is read/write
//! without truncation.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure to create, open, or resize the shared file.
#[derive(Debug, Error)]
#[error("file stream failure on {}: {source}", .path.display())]
pub struct FileStreamError {
    /// The file the operation targeted.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// Factory for independent handles to a single shared file.
#[derive(Debug, Clone)]
pub struct FileStreamProvider {
    path: PathBuf,
}

impl FileStreamProvider {
    /// Binds to `path`, creating an empty file there if none exists.
    /// Existing content is left untouched.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, FileStreamError> {
        let path = path.into();
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| FileStreamError {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path })
    }

    /// Path of the shared file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncates or extends the file to `size` bytes.
    pub fn resize(&self, size: u64) -> Result<(), FileStreamError> {
        self.create_stream()?
            .set_len(size)
            .map_err(|source| self.error(source))
    }

    /// Opens a fresh read/write handle with its own cursor. Never
    /// truncates.
    pub fn create_stream(&self) -> Result<File, FileStreamError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| self.error(source))
    }

    fn error(&self, source: io::Error) -> FileStreamError {
        FileStreamError {
            path: self.path.clone(),
            source,
        }
    }
}
