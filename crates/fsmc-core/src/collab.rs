//! Interfaces consumed from collaborators outside the codec core.
//!
//! Storage adapters and reporting sinks live behind these seams; the codec
//! only ever sees opaque bytes and a finished report.

use crate::error::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Opaque persistence for a compressed stream (filesystem, object store, ...).
pub trait BlobStore {
    fn put(&self, bytes: &[u8]) -> Result<()>;
    fn get(&self) -> Result<Vec<u8>>;
}

/// Local-file `BlobStore`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl BlobStore for FileStore {
    fn put(&self, bytes: &[u8]) -> Result<()> {
        std::fs::write(&self.path, bytes)?;
        tracing::debug!("FileStore: wrote {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    fn get(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

/// Ratio and throughput figures handed to reporting adapters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionReport {
    pub symbols: u64,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub elapsed: Duration,
}

impl CompressionReport {
    /// Compressed size over original size (lower is better).
    pub fn ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        self.compressed_bytes as f64 / self.original_bytes as f64
    }

    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.original_bytes as f64 / (1024.0 * 1024.0) / secs
    }
}
