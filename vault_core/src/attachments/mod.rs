//! Attachment Resolver - turns a loose media reference into a displayable URL.
//!
//! Resolution order:
//!
//! 1. the custom resolver, if one is set, which may answer with a URL, raw bytes,
//!    or a path to read;
//! 2. an absolute path is read directly;
//! 3. otherwise each candidate under the attachment root is tried in order:
//!    `root/reference`, then `root/<folder>/reference` for every configured folder.
//!
//! Two caches sit in front of this: resolved URLs keyed by the case-folded
//! reference, and in-flight resolutions, so concurrent requests for the same
//! reference share one read. Results are committed only on success, and only if
//! the in-flight entry that started the read is still registered: a `clear` or a
//! `prime` made while the read was running wins over its result.

mod mime;

pub use mime::*;

use async_trait::async_trait;
use base64::Engine;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::DEFAULT_ATTACHMENT_FOLDERS;
use crate::error::AttachmentError;
use crate::ports::FileSystemPort;

/// What a custom resolver found for a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomResolution {
    /// A ready-to-display URL.
    Url(String),
    /// Raw bytes; the mime type is inferred from the reference when absent.
    Bytes { bytes: Vec<u8>, mime: Option<String> },
    /// A path to read through the file-system port.
    Path(PathBuf),
}

/// A host-supplied resolver consulted before any file lookup.
#[async_trait]
pub trait CustomAttachmentResolver: Send + Sync {
    /// Return `None` to fall through to the standard lookup.
    async fn resolve(&self, reference: &str) -> Option<CustomResolution>;
}

/// Creates ephemeral object URLs for bytes.
pub trait ObjectUrlFactory: Send + Sync {
    /// Return `None` when no object URL can be made; a data URL is used instead.
    fn create(&self, bytes: &[u8], mime: &str) -> Option<String>;
}

impl<F> ObjectUrlFactory for F
where
    F: Fn(&[u8], &str) -> Option<String> + Send + Sync,
{
    fn create(&self, bytes: &[u8], mime: &str) -> Option<String> {
        self(bytes, mime)
    }
}

type SharedResolution = Shared<BoxFuture<'static, Result<String, AttachmentError>>>;

#[derive(Default)]
struct CacheState {
    resolved: HashMap<String, String>,
    /// Running resolutions, each tagged with the token it commits under.
    in_flight: HashMap<String, (u64, SharedResolution)>,
    next_token: u64,
}

impl CacheState {
    /// Whether `token` still owns the in-flight slot for `key`.
    fn owns(&self, key: &str, token: u64) -> bool {
        self.in_flight
            .get(key)
            .is_some_and(|(current, _)| *current == token)
    }
}

/// A point-in-time copy of the resolved-URL cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    urls: HashMap<String, String>,
}

impl CacheSnapshot {
    /// The cached URL for `reference`, if any.
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.urls.get(&cache_key(reference)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for CacheSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            urls: iter
                .into_iter()
                .map(|(reference, url)| (cache_key(reference.as_ref()), url.into()))
                .collect(),
        }
    }
}

/// Cache key for a reference: trimmed, forward slashes, lower case.
pub fn cache_key(reference: &str) -> String {
    reference.trim().replace('\\', "/").to_lowercase()
}

/// The handles one resolution runs with, captured when it starts.
#[derive(Clone)]
struct Lookup {
    fs: Arc<dyn FileSystemPort>,
    custom: Option<Arc<dyn CustomAttachmentResolver>>,
    object_urls: Option<Arc<dyn ObjectUrlFactory>>,
    root: Option<PathBuf>,
    folders: Vec<String>,
}

impl Lookup {
    async fn run(self, reference: String) -> Result<String, AttachmentError> {
        if let Some(custom) = &self.custom {
            match custom.resolve(&reference).await {
                Some(CustomResolution::Url(url)) => return Ok(url),
                Some(CustomResolution::Bytes { bytes, mime }) => {
                    let mime = mime.unwrap_or_else(|| mime_for(&reference).to_string());
                    return Ok(self.to_url(&bytes, &mime));
                }
                Some(CustomResolution::Path(path)) => {
                    match self.fs.read_bytes(&path).await {
                        Ok(bytes) => {
                            return Ok(self.to_url(&bytes, mime_for(&path.to_string_lossy())))
                        }
                        Err(err) => {
                            warn!(%reference, path = %path.display(), error = %err, "custom attachment path is unreadable");
                        }
                    }
                }
                None => {}
            }
        }

        let mime = mime_for(&reference);
        for candidate in candidate_paths(self.root.as_deref(), &self.folders, &reference) {
            debug!(%reference, candidate = %candidate.display(), "probing attachment candidate");
            match self.fs.read_bytes(&candidate).await {
                Ok(bytes) => return Ok(self.to_url(&bytes, mime)),
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(%reference, candidate = %candidate.display(), error = %err, "attachment read failed");
                }
            }
        }
        Err(AttachmentError::Unresolvable { reference })
    }

    fn to_url(&self, bytes: &[u8], mime: &str) -> String {
        if let Some(factory) = &self.object_urls {
            if let Some(url) = factory.create(bytes, mime) {
                return url;
            }
        }
        data_url(bytes, mime)
    }
}

/// An inline `data:` URL carrying `bytes` as base64.
pub fn data_url(bytes: &[u8], mime: &str) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Ordered, de-duplicated paths to try for a relative reference.
///
/// An absolute reference yields only itself.
pub fn candidate_paths(root: Option<&Path>, folders: &[String], reference: &str) -> Vec<PathBuf> {
    let relative = reference.trim().replace('\\', "/");
    let relative = Path::new(&relative);
    if relative.is_absolute() {
        return vec![relative.to_path_buf()];
    }

    let base = root.map_or_else(PathBuf::new, Path::to_path_buf);
    let mut candidates = vec![base.join(relative)];
    for folder in folders {
        let candidate = base.join(folder).join(relative);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Resolves attachment references with de-duplicated concurrent reads.
pub struct AttachmentResolver {
    fs: RwLock<Arc<dyn FileSystemPort>>,
    custom: RwLock<Option<Arc<dyn CustomAttachmentResolver>>>,
    object_urls: RwLock<Option<Arc<dyn ObjectUrlFactory>>>,
    root: RwLock<Option<PathBuf>>,
    folders: RwLock<Vec<String>>,
    state: Arc<Mutex<CacheState>>,
}

impl AttachmentResolver {
    /// A resolver reading through `fs`, with the conventional folders and no root.
    pub fn new(fs: Arc<dyn FileSystemPort>) -> Self {
        Self {
            fs: RwLock::new(fs),
            custom: RwLock::new(None),
            object_urls: RwLock::new(None),
            root: RwLock::new(None),
            folders: RwLock::new(
                DEFAULT_ATTACHMENT_FOLDERS
                    .iter()
                    .map(|folder| folder.to_string())
                    .collect(),
            ),
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        self.set_root(Some(root.into()));
        self
    }

    pub fn set_root(&self, root: Option<PathBuf>) {
        *self.root.write() = root;
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.root.read().clone()
    }

    /// Replace the sub-folders searched under the root.
    pub fn set_folders(&self, folders: Vec<String>) {
        *self.folders.write() = folders;
    }

    pub fn set_file_system(&self, fs: Arc<dyn FileSystemPort>) {
        *self.fs.write() = fs;
    }

    pub fn set_custom_resolver(&self, resolver: Arc<dyn CustomAttachmentResolver>) {
        *self.custom.write() = Some(resolver);
    }

    /// Remove the custom resolver; lookups go straight to the file system.
    pub fn reset_custom_resolver(&self) {
        *self.custom.write() = None;
    }

    pub fn set_object_url_factory(&self, factory: Arc<dyn ObjectUrlFactory>) {
        *self.object_urls.write() = Some(factory);
    }

    /// Fall back to data URLs for every byte payload.
    pub fn reset_object_url_factory(&self) {
        *self.object_urls.write() = None;
    }

    fn lookup(&self) -> Lookup {
        Lookup {
            fs: self.fs.read().clone(),
            custom: self.custom.read().clone(),
            object_urls: self.object_urls.read().clone(),
            root: self.root.read().clone(),
            folders: self.folders.read().clone(),
        }
    }

    /// Resolve `reference` to a URL.
    ///
    /// Concurrent calls for the same reference (compared case-insensitively)
    /// await a single underlying resolution.
    pub async fn resolve(&self, reference: &str) -> Result<String, AttachmentError> {
        let key = cache_key(reference);
        if key.is_empty() {
            return Err(AttachmentError::Unresolvable {
                reference: reference.to_string(),
            });
        }

        let pending = {
            let mut state = self.state.lock();
            if let Some(url) = state.resolved.get(&key) {
                debug!(reference = %key, "attachment cache hit");
                return Ok(url.clone());
            }
            match state.in_flight.get(&key) {
                Some((_, pending)) => {
                    debug!(reference = %key, "joining in-flight attachment resolution");
                    pending.clone()
                }
                None => {
                    debug!(reference = %key, "attachment cache miss");
                    let token = state.next_token;
                    state.next_token += 1;
                    let pending = self.start(key.clone(), reference.trim(), token);
                    state.in_flight.insert(key, (token, pending.clone()));
                    pending
                }
            }
        };
        pending.await
    }

    fn start(&self, key: String, reference: &str, token: u64) -> SharedResolution {
        let lookup = self.lookup();
        let state = Arc::clone(&self.state);
        let reference = reference.to_string();
        async move {
            let result = lookup.run(reference).await;
            let mut cache = state.lock();
            if cache.owns(&key, token) {
                cache.in_flight.remove(&key);
                if let Ok(url) = &result {
                    cache.resolved.insert(key, url.clone());
                }
            } else {
                debug!(reference = %key, "attachment cache changed during resolution; discarding result");
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Seed the cache, e.g. after writing new bytes under an existing name.
    ///
    /// A resolution of the same reference that is still running will not
    /// overwrite the seeded URL.
    pub fn prime(&self, reference: &str, url: impl Into<String>) {
        let mut state = self.state.lock();
        let key = cache_key(reference);
        state.in_flight.remove(&key);
        state.resolved.insert(key, url.into());
    }

    /// Drop both caches. Resolutions still running will not commit.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.resolved.clear();
        state.in_flight.clear();
    }

    /// The cached URL for `reference`, without resolving.
    pub fn peek(&self, reference: &str) -> Option<String> {
        self.state.lock().resolved.get(&cache_key(reference)).cloned()
    }

    /// Copy of the resolved-URL cache, for pure rendering.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            urls: self.state.lock().resolved.clone(),
        }
    }

    /// Number of resolutions currently running.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }
}

impl std::fmt::Debug for AttachmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AttachmentResolver")
            .field("root", &*self.root.read())
            .field("resolved", &state.resolved.len())
            .field("in_flight", &state.in_flight.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MemoryFileSystem;

    const PORTRAIT: &str = "/vault/attachments/portrait.png";

    fn setup(yields: usize) -> (Arc<MemoryFileSystem>, AttachmentResolver) {
        let fs = Arc::new(MemoryFileSystem::new().with_yields(yields));
        fs.insert(PORTRAIT, vec![1u8, 2, 3]);
        let resolver = AttachmentResolver::new(fs.clone()).with_root("/vault");
        (fs, resolver)
    }

    struct FixedUrls;

    #[async_trait]
    impl CustomAttachmentResolver for FixedUrls {
        async fn resolve(&self, reference: &str) -> Option<CustomResolution> {
            match reference {
                "logo" => Some(CustomResolution::Url("https://cdn.example/logo.png".into())),
                "raw.bin" => Some(CustomResolution::Bytes {
                    bytes: b"hi".to_vec(),
                    mime: Some("text/plain".into()),
                }),
                "moved.png" => Some(CustomResolution::Path(PathBuf::from(PORTRAIT))),
                _ => None,
            }
        }
    }

    #[test]
    fn test_candidate_paths() {
        let folders = vec!["attachments".to_string(), "images".to_string()];
        let candidates = candidate_paths(Some(Path::new("/vault")), &folders, "maps\\world.png");
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/vault/maps/world.png"),
                PathBuf::from("/vault/attachments/maps/world.png"),
                PathBuf::from("/vault/images/maps/world.png"),
            ]
        );
        assert_eq!(
            candidate_paths(Some(Path::new("/vault")), &folders, "/abs/x.png"),
            vec![PathBuf::from("/abs/x.png")]
        );
        let dupes = vec!["".to_string(), "art".to_string(), "art".to_string()];
        assert_eq!(candidate_paths(None, &dupes, "x.png").len(), 2);
    }

    #[test]
    fn test_data_url() {
        assert_eq!(data_url(b"hi", "text/plain"), "data:text/plain;base64,aGk=");
    }

    #[tokio::test]
    async fn test_resolves_from_conventional_folder() {
        let (fs, resolver) = setup(0);
        let url = resolver.resolve("portrait.png").await.unwrap();
        assert_eq!(url, "data:image/png;base64,AQID");
        assert_eq!(fs.read_count(Path::new("/vault/portrait.png")), 1);
        assert_eq!(fs.read_count(Path::new(PORTRAIT)), 1);

        // Cached under the case-folded key.
        assert_eq!(resolver.resolve("Portrait.PNG").await.unwrap(), url);
        assert_eq!(fs.total_reads(), 2);
        assert_eq!(resolver.peek("PORTRAIT.png"), Some(url));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_read() {
        let (fs, resolver) = setup(3);
        let (a, b) = tokio::join!(resolver.resolve("portrait.png"), resolver.resolve("Portrait.png"));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(fs.read_count(Path::new(PORTRAIT)), 1);
        assert_eq!(fs.total_reads(), 2);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_absolute_path() {
        let (fs, resolver) = setup(0);
        assert!(resolver.resolve(PORTRAIT).await.is_ok());
        assert_eq!(fs.total_reads(), 1);
        assert!(resolver.resolve("/elsewhere/missing.png").await.is_err());
    }

    #[tokio::test]
    async fn test_failure_leaves_caches_untouched() {
        let (_fs, resolver) = setup(0);
        let err = resolver.resolve("missing.png").await.unwrap_err();
        assert_eq!(
            err,
            AttachmentError::Unresolvable {
                reference: "missing.png".into()
            }
        );
        assert!(resolver.snapshot().is_empty());
        assert_eq!(resolver.in_flight(), 0);
        assert!(resolver.resolve("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_custom_resolver_order() {
        let (fs, resolver) = setup(0);
        resolver.set_custom_resolver(Arc::new(FixedUrls));

        assert_eq!(
            resolver.resolve("logo").await.unwrap(),
            "https://cdn.example/logo.png"
        );
        assert_eq!(
            resolver.resolve("raw.bin").await.unwrap(),
            "data:text/plain;base64,aGk="
        );
        assert_eq!(
            resolver.resolve("moved.png").await.unwrap(),
            "data:image/png;base64,AQID"
        );
        assert_eq!(fs.total_reads(), 1);

        resolver.reset_custom_resolver();
        resolver.clear();
        assert!(resolver.resolve("logo").await.is_err());
    }

    #[tokio::test]
    async fn test_object_url_factory() {
        let (_fs, resolver) = setup(0);
        resolver.set_object_url_factory(Arc::new(|bytes: &[u8], mime: &str| {
            Some(format!("blob:{mime}:{}", bytes.len()))
        }));
        assert_eq!(
            resolver.resolve("portrait.png").await.unwrap(),
            "blob:image/png:3"
        );

        resolver.set_object_url_factory(Arc::new(|_: &[u8], _: &str| None));
        resolver.clear();
        assert!(resolver
            .resolve("portrait.png")
            .await
            .unwrap()
            .starts_with("data:image/png;base64,"));

        resolver.reset_object_url_factory();
    }

    #[tokio::test]
    async fn test_prime_and_clear() {
        let (fs, resolver) = setup(0);
        resolver.prime("Portrait.png", "blob:fresh");
        assert_eq!(resolver.resolve("portrait.png").await.unwrap(), "blob:fresh");
        assert_eq!(fs.total_reads(), 0);

        resolver.clear();
        assert_eq!(resolver.peek("portrait.png"), None);
        assert!(resolver.resolve("portrait.png").await.unwrap().starts_with("data:"));
    }

    #[tokio::test]
    async fn test_clear_during_resolution_discards_result() {
        let (_fs, resolver) = setup(5);
        let pending = resolver.resolve("portrait.png");
        let clearing = async {
            tokio::task::yield_now().await;
            resolver.clear();
        };
        let (result, ()) = tokio::join!(pending, clearing);
        assert!(result.is_ok());
        assert_eq!(resolver.peek("portrait.png"), None);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_prime_during_resolution_wins() {
        let (_fs, resolver) = setup(5);
        let pending = resolver.resolve("portrait.png");
        let priming = async {
            tokio::task::yield_now().await;
            resolver.prime("portrait.png", "blob:fresh");
        };
        let (result, ()) = tokio::join!(pending, priming);
        assert_eq!(result.unwrap(), "data:image/png;base64,AQID");
        assert_eq!(resolver.peek("portrait.png").as_deref(), Some("blob:fresh"));
        assert_eq!(resolver.in_flight(), 0);

        // A later resolution after the stale one finishes keeps the seeded URL.
        assert_eq!(resolver.resolve("portrait.png").await.unwrap(), "blob:fresh");
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot: CacheSnapshot = [("Maps/World.png", "blob:1")].into_iter().collect();
        assert_eq!(snapshot.get("maps/world.png"), Some("blob:1"));
        assert_eq!(snapshot.len(), 1);
    }
}
