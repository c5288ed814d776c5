//! Collaborator ports. The core consumes these traits and never performs I/O
//! on its own; hosts plug in real implementations, tests plug in the fakes.

mod memory;
mod native;

pub use memory::*;
pub use native::*;

use async_trait::async_trait;
use std::path::Path;

use crate::error::PortError;
use crate::index::IndexEntry;

/// File access used by document loading, saving and attachment reads.
#[async_trait]
pub trait FileSystemPort: Send + Sync {
    async fn read_text(&self, path: &Path) -> Result<String, PortError>;

    async fn write_text(&self, path: &Path, contents: &str) -> Result<(), PortError>;

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, PortError>;
}

/// Source of index data.
#[async_trait]
pub trait IndexBackingPort: Send + Sync {
    /// The raw bulk-scan payload: `{version, generated_at, entities: {id: entry}}`.
    async fn bulk_scan(&self) -> Result<String, PortError>;

    /// Authoritative single-id lookup against the live backing index.
    async fn get_by_id(&self, id: &str) -> Result<Option<IndexEntry>, PortError>;
}
