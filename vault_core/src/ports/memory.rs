//! In-memory port implementations for tests and previews.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{FileSystemPort, IndexBackingPort};
use crate::error::PortError;
use crate::index::IndexEntry;

/// A file system held in a map, counting every read.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    reads: Mutex<HashMap<PathBuf, usize>>,
    writes: AtomicUsize,
    /// Scheduler yields before each read completes, so concurrent callers interleave.
    yields: usize,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the scheduler `yields` times inside every read.
    pub fn with_yields(mut self, yields: usize) -> Self {
        self.yields = yields;
        self
    }

    /// Store a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.into(), contents.into());
    }

    /// Move a file, as a rename in a file browser would.
    pub fn rename(&self, from: &Path, to: impl Into<PathBuf>) -> bool {
        let mut files = self.files.lock();
        match files.remove(from) {
            Some(contents) => {
                files.insert(to.into(), contents);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.files.lock().remove(path).is_some()
    }

    /// Current contents of a file as text.
    pub fn text(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Number of reads (text or bytes) issued for `path`.
    pub fn read_count(&self, path: &Path) -> usize {
        self.reads.lock().get(path).copied().unwrap_or(0)
    }

    /// Number of reads issued across all paths.
    pub fn total_reads(&self) -> usize {
        self.reads.lock().values().sum()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, PortError> {
        *self.reads.lock().entry(path.to_path_buf()).or_default() += 1;
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| PortError::NotFound(path.to_path_buf()))
    }
}

#[async_trait]
impl FileSystemPort for MemoryFileSystem {
    async fn read_text(&self, path: &Path) -> Result<String, PortError> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|err| PortError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    async fn write_text(&self, path: &Path, contents: &str) -> Result<(), PortError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(path, contents.as_bytes().to_vec());
        Ok(())
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, PortError> {
        self.read(path).await
    }
}

/// An index backing with a settable bulk payload and live entries.
#[derive(Debug, Default)]
pub struct MemoryIndexBacking {
    payload: Mutex<String>,
    live: Mutex<HashMap<String, IndexEntry>>,
    lookups: AtomicUsize,
    offline: Mutex<bool>,
}

impl MemoryIndexBacking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the bulk-scan payload.
    pub fn set_payload(&self, payload: impl Into<String>) {
        *self.payload.lock() = payload.into();
    }

    /// Insert or replace a live entry returned by `get_by_id`.
    pub fn set_live(&self, entry: IndexEntry) {
        self.live.lock().insert(entry.id.clone(), entry);
    }

    pub fn remove_live(&self, id: &str) {
        self.live.lock().remove(id);
    }

    /// Make every call fail with a backend error.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    /// Number of `get_by_id` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), PortError> {
        if *self.offline.lock() {
            Err(PortError::Backend("index backing is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IndexBackingPort for MemoryIndexBacking {
    async fn bulk_scan(&self) -> Result<String, PortError> {
        self.check_online()?;
        Ok(self.payload.lock().clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<IndexEntry>, PortError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.live.lock().get(id).cloned())
    }
}
