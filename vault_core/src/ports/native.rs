//! File-system port backed by `tokio::fs`.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::FileSystemPort;
use crate::error::PortError;

/// Reads and writes the real file system, optionally relative to a base directory.
#[derive(Debug, Clone, Default)]
pub struct NativeFileSystem {
    base: Option<PathBuf>,
}

impl NativeFileSystem {
    /// Resolve paths exactly as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn port_error(path: &Path, err: std::io::Error) -> PortError {
    if err.kind() == ErrorKind::NotFound {
        PortError::NotFound(path.to_path_buf())
    } else {
        PortError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl FileSystemPort for NativeFileSystem {
    async fn read_text(&self, path: &Path) -> Result<String, PortError> {
        let full = self.resolve(path);
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|err| port_error(path, err))
    }

    async fn write_text(&self, path: &Path, contents: &str) -> Result<(), PortError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| port_error(path, err))?;
            }
        }
        tokio::fs::write(&full, contents)
            .await
            .map_err(|err| port_error(path, err))
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, PortError> {
        let full = self.resolve(path);
        tokio::fs::read(&full)
            .await
            .map_err(|err| port_error(path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::with_base(dir.path());

        fs.write_text(Path::new("npcs/ember.md"), "---\nid: x\n---\n")
            .await
            .unwrap();
        let text = fs.read_text(Path::new("npcs/ember.md")).await.unwrap();
        assert_eq!(text, "---\nid: x\n---\n");

        let bytes = fs
            .read_bytes(&dir.path().join("npcs/ember.md"))
            .await
            .unwrap();
        assert_eq!(bytes.len(), text.len());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::with_base(dir.path());
        let err = fs.read_text(Path::new("nope.md")).await.unwrap_err();
        assert_eq!(err, PortError::NotFound(PathBuf::from("nope.md")));
    }
}
