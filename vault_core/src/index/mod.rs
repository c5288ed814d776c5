//! Identity Index - resolves a stable entity id to its current file location.
//!
//! The cache is seeded from a bulk scan and refreshed entry by entry through the
//! authoritative resolver on a miss or on forced revalidation. That resolver
//! consults the live backing index, which is how renamed files are discovered.
//! "Not found" is an ordinary answer, never an error.

mod payload;

pub use payload::*;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use vault_model::{Entity, EntityKind};

use crate::ports::IndexBackingPort;

/// Entity fields copied into an entry's metadata snapshot for listings.
pub const PROMOTED_FIELDS: &[&str] = &[
    "aliases", "tags", "summary", "image", "role", "status", "region", "number",
];

/// Where an entity lives and how to list it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    /// Current, authoritative location.
    pub path: PathBuf,
    /// Modification time in milliseconds since the epoch.
    #[serde(default)]
    pub mtime: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IndexEntry {
    /// Build an entry for an entity stored at `path`.
    pub fn from_entity(entity: &Entity, path: impl Into<PathBuf>, mtime: f64) -> Self {
        let fields = entity.to_fields();
        let metadata = PROMOTED_FIELDS
            .iter()
            .filter_map(|key| fields.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect();
        Self {
            id: entity.id.to_string(),
            entity_type: entity.kind().as_str().to_string(),
            name: entity.name.clone(),
            path: path.into(),
            mtime,
            metadata,
        }
    }

    pub fn kind(&self) -> Option<EntityKind> {
        EntityKind::from_type_name(&self.entity_type)
    }
}

/// How a lookup treats the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Serve a cached entry when there is one.
    Cached,
    /// Always ask the authoritative resolver.
    Revalidate,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<String, IndexEntry>,
    /// Ids whose cached location was confirmed by the resolver or a save and
    /// has not been superseded by a newer bulk scan row.
    confirmed: HashSet<String>,
    version: Option<u64>,
    generated_at: Option<String>,
}

/// The id -> location cache.
pub struct IdentityIndex {
    backing: RwLock<Arc<dyn IndexBackingPort>>,
    state: RwLock<IndexState>,
}

impl IdentityIndex {
    /// Create an empty index over `backing`. Call [`IdentityIndex::refresh`] to seed it.
    pub fn new(backing: Arc<dyn IndexBackingPort>) -> Self {
        Self {
            backing: RwLock::new(backing),
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Swap the backing port. Cached entries are kept.
    pub fn set_backing(&self, backing: Arc<dyn IndexBackingPort>) {
        *self.backing.write() = backing;
    }

    fn backing(&self) -> Arc<dyn IndexBackingPort> {
        self.backing.read().clone()
    }

    /// Reload the cache from a bulk scan.
    ///
    /// A malformed payload empties the index rather than failing. If the port
    /// itself fails, the current cache is kept. A confirmed entry wins over a
    /// scan row unless the row's `mtime` is newer. Returns the number of entries.
    pub async fn refresh(&self) -> usize {
        let raw = match self.backing().bulk_scan().await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "bulk index scan failed; keeping cached entries");
                return self.len();
            }
        };
        let bulk = match parse_bulk_payload(&raw) {
            Ok(bulk) => bulk,
            Err(err) => {
                warn!(error = %err, "malformed bulk index payload; starting from an empty index");
                BulkIndex::default()
            }
        };

        let mut state = self.state.write();
        let mut entries: HashMap<String, IndexEntry> = bulk
            .entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        let mut confirmed = HashSet::new();
        for id in std::mem::take(&mut state.confirmed) {
            let Some(cached) = state.entries.get(&id) else {
                continue;
            };
            if entries.get(&id).is_some_and(|row| row.mtime > cached.mtime) {
                debug!(id = %id, "bulk scan row is newer than the confirmed entry");
                continue;
            }
            entries.insert(id.clone(), cached.clone());
            confirmed.insert(id);
        }
        state.entries = entries;
        state.confirmed = confirmed;
        state.version = bulk.version;
        state.generated_at = bulk.generated_at;
        debug!(entries = state.entries.len(), "identity index refreshed");
        state.entries.len()
    }

    /// Look up an id, serving the cache when possible.
    pub async fn get(&self, id: &str) -> Option<IndexEntry> {
        self.lookup(id, LookupMode::Cached).await
    }

    /// Look up an id, always consulting the authoritative resolver.
    pub async fn revalidate(&self, id: &str) -> Option<IndexEntry> {
        self.lookup(id, LookupMode::Revalidate).await
    }

    /// Look up an id.
    ///
    /// A resolver hit replaces the cached entry. A resolver miss reports not-found
    /// and, when revalidating, evicts the stale entry. A resolver failure falls
    /// back to whatever the cache holds.
    pub async fn lookup(&self, id: &str, mode: LookupMode) -> Option<IndexEntry> {
        let key = canonical_key(id);
        let cached = self.state.read().entries.get(&key).cloned();
        if mode == LookupMode::Cached {
            if let Some(entry) = cached {
                debug!(id = %key, "index cache hit");
                return Some(entry);
            }
        }

        match self.backing().get_by_id(&key).await {
            Ok(Some(mut entry)) => {
                entry.id = key.clone();
                if cached.as_ref().is_some_and(|old| old.path != entry.path) {
                    debug!(id = %key, path = %entry.path.display(), "entity moved");
                }
                let mut state = self.state.write();
                state.entries.insert(key.clone(), entry.clone());
                state.confirmed.insert(key);
                Some(entry)
            }
            Ok(None) => {
                if mode == LookupMode::Revalidate && cached.is_some() {
                    debug!(id = %key, "entity no longer exists; evicting");
                    let mut state = self.state.write();
                    state.entries.remove(&key);
                    state.confirmed.remove(&key);
                }
                None
            }
            Err(err) => {
                warn!(id = %key, error = %err, "index resolver failed; using cached entry");
                cached
            }
        }
    }

    /// Current path for an id, if known.
    pub async fn path_of(&self, id: &str) -> Option<PathBuf> {
        self.get(id).await.map(|entry| entry.path)
    }

    /// Record a freshly confirmed location, e.g. after a save or rename.
    pub fn upsert(&self, mut entry: IndexEntry) {
        let key = canonical_key(&entry.id);
        entry.id = key.clone();
        let mut state = self.state.write();
        state.entries.insert(key.clone(), entry);
        state.confirmed.insert(key);
    }

    /// Drop an id from the cache.
    pub fn forget(&self, id: &str) -> Option<IndexEntry> {
        let key = canonical_key(id);
        let mut state = self.state.write();
        state.confirmed.remove(&key);
        state.entries.remove(&key)
    }

    /// Snapshot of every entry, ordered by id.
    pub fn list(&self) -> Vec<IndexEntry> {
        let mut entries: Vec<IndexEntry> = self.state.read().entries.values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Snapshot of the entries of one kind, ordered by id.
    pub fn list_by_kind(&self, kind: EntityKind) -> Vec<IndexEntry> {
        self.list()
            .into_iter()
            .filter(|entry| entry.kind() == Some(kind))
            .collect()
    }

    /// The cached entry whose path is `path`, if any.
    pub fn find_by_path(&self, path: &Path) -> Option<IndexEntry> {
        self.state
            .read()
            .entries
            .values()
            .find(|entry| entry.path == path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version of the last bulk payload.
    pub fn version(&self) -> Option<u64> {
        self.state.read().version
    }

    /// Generation timestamp of the last bulk payload.
    pub fn generated_at(&self) -> Option<String> {
        self.state.read().generated_at.clone()
    }
}

impl std::fmt::Debug for IdentityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityIndex")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
