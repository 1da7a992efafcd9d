#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Fixtures shared by the workspace test suites: scratch directories, a
//! range-capable HTTP server for http(s) reader and sync tests, generated
//! data/seed file pairs, and a metric expectation checker.

mod expectations;
mod gendata;
mod http_server;

pub use expectations::assert_metrics;
pub use gendata::{GenDataOptions, generate_pair};
pub use http_server::HttpFixtureServer;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A scratch directory removed on drop.
pub struct TestDir {
    dir: tempfile::TempDir,
}

impl TestDir {
    /// Creates a fresh scratch directory.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Root of the scratch directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `contents` to `name` under the scratch root and returns the
    /// full path.
    pub fn write_file(&self, name: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Path for `name` under the scratch root, whether or not it exists
    /// yet.
    #[must_use]
    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// `file://` URI for `name` under the scratch root.
    #[must_use]
    pub fn file_uri(&self, name: &str) -> String {
        format!("file://{}", self.join(name).display())
    }
}

/// Reads a file fully, panicking with the path on failure. Test-only
/// convenience.
#[must_use]
pub fn read_file(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|error| panic!("cannot read {}: {error}", path.display()))
}
