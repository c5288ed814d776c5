//! The vault context: every swappable handle in one place.
//!
//! The file-system port, the reference normalizer, the custom attachment
//! resolver and the attachment caches are shared by every screen, but none of
//! them is a hidden global. Each is set on a [`VaultContext`] and each has an
//! explicit reset.

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use vault_model::{
    Entity, ReferenceField, ReferenceNormalizer, ReferencePolicy, ValidationIssue,
    NormalizerHandle,
};

use crate::attachments::{AttachmentResolver, CustomAttachmentResolver};
use crate::codec::{split_document, Document, EntityCodec, RawDocument};
use crate::config::VaultConfig;
use crate::error::{CodecError, EntityValidationError, VaultError};
use crate::index::{canonical_key, IdentityIndex, IndexEntry};
use crate::markdown::{render_with_cache, MarkdownDocument};
use crate::ports::{FileSystemPort, IndexBackingPort, NativeFileSystem};

pub struct VaultContext {
    default_fs: Arc<dyn FileSystemPort>,
    fs: RwLock<Arc<dyn FileSystemPort>>,
    normalizer: NormalizerHandle,
    policy: RwLock<ReferencePolicy>,
    codec: EntityCodec,
    index: IdentityIndex,
    attachments: AttachmentResolver,
}

impl VaultContext {
    /// Build a context over `fs` and `backing`. `fs` is also what
    /// [`VaultContext::reset_file_system`] restores.
    pub fn new(fs: Arc<dyn FileSystemPort>, backing: Arc<dyn IndexBackingPort>) -> Self {
        Self {
            default_fs: fs.clone(),
            fs: RwLock::new(fs.clone()),
            normalizer: NormalizerHandle::new(),
            policy: RwLock::new(ReferencePolicy::default()),
            codec: EntityCodec::new(),
            index: IdentityIndex::new(backing),
            attachments: AttachmentResolver::new(fs),
        }
    }

    /// Build a context on the native file system from configuration.
    pub fn from_config(config: &VaultConfig, backing: Arc<dyn IndexBackingPort>) -> Self {
        let fs: Arc<dyn FileSystemPort> = match &config.vault.root {
            Some(root) => Arc::new(NativeFileSystem::with_base(root.clone())),
            None => Arc::new(NativeFileSystem::new()),
        };
        let context = Self::new(fs, backing);
        context
            .attachments
            .set_root(config.attachment_root().map(Path::to_path_buf));
        context
            .attachments
            .set_folders(config.attachments.folders.clone());
        context.set_reference_policy(config.references.policy);
        context
    }

    pub fn codec(&self) -> &EntityCodec {
        &self.codec
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    pub fn attachments(&self) -> &AttachmentResolver {
        &self.attachments
    }

    pub fn normalizer(&self) -> &NormalizerHandle {
        &self.normalizer
    }

    pub fn file_system(&self) -> Arc<dyn FileSystemPort> {
        self.fs.read().clone()
    }

    /// Route document and attachment I/O through `fs`.
    pub fn set_file_system(&self, fs: Arc<dyn FileSystemPort>) {
        *self.fs.write() = fs.clone();
        self.attachments.set_file_system(fs);
    }

    /// Restore the file system the context was built with.
    pub fn reset_file_system(&self) {
        self.set_file_system(self.default_fs.clone());
    }

    pub fn set_normalizer(&self, normalizer: impl ReferenceNormalizer + 'static) {
        self.normalizer.configure(normalizer);
    }

    /// Restore the id-grammar normalizer.
    pub fn reset_normalizer(&self) {
        self.normalizer.reset();
    }

    pub fn set_attachment_resolver(&self, resolver: Arc<dyn CustomAttachmentResolver>) {
        self.attachments.set_custom_resolver(resolver);
    }

    pub fn reset_attachment_resolver(&self) {
        self.attachments.reset_custom_resolver();
    }

    /// Drop both attachment caches.
    pub fn reset_attachment_caches(&self) {
        self.attachments.clear();
    }

    pub fn set_index_backing(&self, backing: Arc<dyn IndexBackingPort>) {
        self.index.set_backing(backing);
    }

    pub fn reference_policy(&self) -> ReferencePolicy {
        *self.policy.read()
    }

    pub fn set_reference_policy(&self, policy: ReferencePolicy) {
        *self.policy.write() = policy;
    }

    /// Read and decode the document at `path`.
    pub async fn load(&self, path: &Path) -> Result<Document, VaultError> {
        let bytes = self.file_system().read_bytes(path).await?;
        Ok(self.codec.decode(path, &bytes)?)
    }

    /// Read the document at `path` without validating it.
    ///
    /// A malformed header does not fail the read: the result carries empty
    /// fields, the whole text as body, and a warning.
    pub async fn load_raw(&self, path: &Path) -> Result<RawDocument, VaultError> {
        let text = self.file_system().read_text(path).await?;
        Ok(split_document(&text))
    }

    /// Load the document for `id` wherever it currently lives.
    ///
    /// If the indexed path is gone or now holds another entity, the index is
    /// revalidated once and the load retried. An unknown id is `Ok(None)`.
    pub async fn load_by_id(&self, id: &str) -> Result<Option<Document>, VaultError> {
        let id = canonical_key(id);
        let Some(entry) = self.index.get(&id).await else {
            return Ok(None);
        };

        match self.load(&entry.path).await {
            Ok(document) if document.entity.id.as_str() == id => return Ok(Some(document)),
            Ok(document) => {
                debug!(%id, found = %document.entity.id, path = %entry.path.display(), "indexed path holds another entity; revalidating");
            }
            Err(VaultError::Port(err)) if err.is_not_found() => {
                debug!(%id, path = %entry.path.display(), "indexed path is gone; revalidating");
            }
            Err(err) => return Err(err),
        }

        let Some(entry) = self.index.revalidate(&id).await else {
            return Ok(None);
        };
        self.load(&entry.path).await.map(Some)
    }

    /// Validate, encode and write `document`, then record its location.
    ///
    /// Nothing is written when validation or the reference policy fails.
    pub async fn save(&self, document: &Document) -> Result<(), VaultError> {
        self.check_references(&document.entity, self.reference_policy())
            .map_err(|err| EntityValidationError {
                path: document.path.clone(),
                ..err
            })?;
        let bytes = self.codec.encode_document(document)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| CodecError::InvalidUtf8(document.path.clone()))?;

        self.file_system()
            .write_text(&document.path, &text)
            .await?;
        self.index.upsert(IndexEntry::from_entity(
            &document.entity,
            &document.path,
            now_millis(),
        ));
        debug!(id = %document.entity.id, path = %document.path.display(), "document saved");
        Ok(())
    }

    /// Apply `policy` to the references the configured normalizer rejects.
    ///
    /// `Reject` fails with one issue per bad reference. `Warn` logs them and
    /// returns them. `StoreAsIs` returns nothing.
    pub fn check_references(
        &self,
        entity: &Entity,
        policy: ReferencePolicy,
    ) -> Result<Vec<ReferenceField>, EntityValidationError> {
        let report = vault_model::check_references(
            entity.references(),
            self.normalizer.current().as_ref(),
        );
        if report.is_clean() {
            return Ok(Vec::new());
        }

        match policy {
            ReferencePolicy::Reject => {
                let issues = report
                    .rejected
                    .iter()
                    .map(|reference| {
                        ValidationIssue::new(
                            reference.field.clone(),
                            format!("'{}' is not a valid entity reference", reference.value),
                        )
                    })
                    .collect();
                Err(EntityValidationError::new(
                    entity.kind().as_str(),
                    "",
                    issues,
                ))
            }
            ReferencePolicy::Warn => {
                for reference in &report.rejected {
                    warn!(id = %entity.id, field = %reference.field, reference = %reference.value, "invalid entity reference");
                }
                Ok(report.rejected)
            }
            ReferencePolicy::StoreAsIs => Ok(Vec::new()),
        }
    }

    /// Render a document body with whatever attachment URLs are cached.
    pub fn render_body(&self, document: &Document) -> MarkdownDocument {
        render_with_cache(&document.body, &self.attachments.snapshot())
    }
}

impl std::fmt::Debug for VaultContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultContext")
            .field("policy", &self.reference_policy())
            .field("index", &self.index)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DocumentFormat;
    use crate::markdown::{Block, Inline};
    use crate::ports::{MemoryFileSystem, MemoryIndexBacking};
    use std::path::PathBuf;
    use vault_model::{Alliance, EntityData, EntityId, EntityKind};

    const EMBER: &str = "---\nid: npc_ember_fl4m3\ntype: npc\nname: Ember Thorn\naliases: [Flame]\n---\nEmber Thorn stands watch over the forge.\n";

    fn entry(path: &str) -> IndexEntry {
        IndexEntry {
            id: "npc_ember_fl4m3".into(),
            entity_type: "npc".into(),
            name: "Ember Thorn".into(),
            path: PathBuf::from(path),
            mtime: 0.0,
            metadata: Default::default(),
        }
    }

    fn payload(path: &str) -> String {
        serde_json::json!({
            "version": 1,
            "generated_at": "2026-10-17T09:00:00Z",
            "entities": {"npc_ember_fl4m3": entry(path)}
        })
        .to_string()
    }

    fn setup() -> (Arc<MemoryFileSystem>, Arc<MemoryIndexBacking>, VaultContext) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("npcs/ember.md", EMBER);
        let backing = Arc::new(MemoryIndexBacking::new());
        backing.set_payload(payload("npcs/ember.md"));
        let context = VaultContext::new(fs.clone(), backing.clone());
        (fs, backing, context)
    }

    fn ember_with_alliance(faction: &str) -> Entity {
        let mut entity = Entity::new(EntityKind::Npc, "Ember Thorn")
            .with_id(EntityId::parse("npc_ember_fl4m3").unwrap());
        if let EntityData::Npc(data) = &mut entity.data {
            data.alliances = Some(vec![Alliance::new(faction)]);
        }
        entity
    }

    #[tokio::test]
    async fn test_load() {
        let (_fs, _backing, context) = setup();
        let document = context.load(Path::new("npcs/ember.md")).await.unwrap();
        assert_eq!(document.entity.aliases, Some(vec!["Flame".to_string()]));
        assert_eq!(document.body, "Ember Thorn stands watch over the forge.\n");

        let missing = context.load(Path::new("npcs/nobody.md")).await.unwrap_err();
        assert!(matches!(missing, VaultError::Port(ref err) if err.is_not_found()));
    }

    #[tokio::test]
    async fn test_load_raw_falls_back_on_malformed_header() {
        let (fs, _backing, context) = setup();
        let broken = "---\nname: Ember\n   role: smith\n---\nbody\n";
        fs.insert("npcs/broken.md", broken);

        assert!(context.load(Path::new("npcs/broken.md")).await.is_err());
        let raw = context.load_raw(Path::new("npcs/broken.md")).await.unwrap();
        assert!(raw.fields.is_empty());
        assert_eq!(raw.body, broken);
        assert_eq!(raw.warnings.len(), 1);

        let raw = context.load_raw(Path::new("npcs/ember.md")).await.unwrap();
        assert!(raw.warnings.is_empty());
        assert_eq!(raw.fields["name"], serde_json::json!("Ember Thorn"));

        let missing = context.load_raw(Path::new("npcs/nobody.md")).await.unwrap_err();
        assert!(matches!(missing, VaultError::Port(ref err) if err.is_not_found()));
    }

    #[tokio::test]
    async fn test_load_by_id_after_rename() {
        let (fs, backing, context) = setup();
        assert_eq!(context.index().refresh().await, 1);
        let before = context.load_by_id("NPC_Ember_FL4M3").await.unwrap().unwrap();
        assert_eq!(before.path, PathBuf::from("npcs/ember.md"));

        assert!(fs.rename(Path::new("npcs/ember.md"), "archive/ember.md"));
        backing.set_live(entry("archive/ember.md"));

        let after = context.load_by_id("npc_ember_fl4m3").await.unwrap().unwrap();
        assert_eq!(after.path, PathBuf::from("archive/ember.md"));
        assert_eq!(after.entity, before.entity);
        assert_eq!(
            context.index().path_of("npc_ember_fl4m3").await,
            Some(PathBuf::from("archive/ember.md"))
        );
        assert_eq!(backing.lookups(), 1);
    }

    #[tokio::test]
    async fn test_refresh_moves_id_to_new_path() {
        let (fs, backing, context) = setup();
        context.index().refresh().await;

        fs.rename(Path::new("npcs/ember.md"), "people/ember.md");
        fs.insert(
            "people/ember.md",
            EMBER.replace("aliases: [Flame]", "aliases: [Flame, Smith]"),
        );
        backing.set_payload(payload("people/ember.md"));
        context.index().refresh().await;

        let entry = context.index().get("npc_ember_fl4m3").await.unwrap();
        assert_eq!(entry.path, PathBuf::from("people/ember.md"));
        let document = context.load(&entry.path).await.unwrap();
        assert_eq!(
            document.entity.aliases,
            Some(vec!["Flame".to_string(), "Smith".to_string()])
        );
    }

    #[tokio::test]
    async fn test_load_by_id_unknown_and_deleted() {
        let (fs, _backing, context) = setup();
        assert!(context.load_by_id("npc_nobody_zz99").await.unwrap().is_none());

        context.index().refresh().await;
        fs.remove(Path::new("npcs/ember.md"));
        assert!(context.load_by_id("npc_ember_fl4m3").await.unwrap().is_none());
        assert!(context.index().is_empty());
    }

    #[tokio::test]
    async fn test_save_writes_and_indexes() {
        let (fs, _backing, context) = setup();
        let mut document = context.load(Path::new("npcs/ember.md")).await.unwrap();
        document.entity.summary = Some("Smith of the old forge".into());
        context.save(&document).await.unwrap();

        let text = fs.text(Path::new("npcs/ember.md")).unwrap();
        assert!(text.contains("summary: Smith of the old forge\n"));
        assert!(text.ends_with("---\nEmber Thorn stands watch over the forge.\n"));

        let entry = context.index().get("npc_ember_fl4m3").await.unwrap();
        assert_eq!(entry.path, PathBuf::from("npcs/ember.md"));
        assert_eq!(
            entry.metadata.get("summary"),
            Some(&serde_json::json!("Smith of the old forge"))
        );
    }

    #[tokio::test]
    async fn test_invalid_document_is_never_written() {
        let (fs, _backing, context) = setup();
        let mut entity = ember_with_alliance("faction_ash_ab12");
        entity.name = "  ".into();
        let document = Document::new("npcs/broken.md", DocumentFormat::HeaderBody, entity, "");

        let err = context.save(&document).await.unwrap_err();
        assert!(matches!(err, VaultError::Codec(CodecError::Validation(_))));
        assert_eq!(fs.write_count(), 0);
        assert!(context.index().find_by_path(Path::new("npcs/broken.md")).is_none());
    }

    #[tokio::test]
    async fn test_reference_policies() {
        let (fs, _backing, context) = setup();
        let entity = ember_with_alliance("the ash court");

        let rejected = context
            .check_references(&entity, ReferencePolicy::Warn)
            .unwrap();
        assert_eq!(
            rejected,
            vec![ReferenceField::new("alliances[0].faction", "the ash court")]
        );
        assert!(context
            .check_references(&entity, ReferencePolicy::StoreAsIs)
            .unwrap()
            .is_empty());
        let err = context
            .check_references(&entity, ReferencePolicy::Reject)
            .unwrap_err();
        assert_eq!(err.entity_type, "npc");
        assert_eq!(err.issues[0].field, "alliances[0].faction");

        context.set_reference_policy(ReferencePolicy::Reject);
        let document = Document::new("npcs/ember.md", DocumentFormat::HeaderBody, entity, "");
        let err = context.save(&document).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(ref e) if e.path == PathBuf::from("npcs/ember.md")));
        assert_eq!(fs.write_count(), 0);
    }

    #[tokio::test]
    async fn test_normalizer_configure_and_reset() {
        let (_fs, _backing, context) = setup();
        let entity = ember_with_alliance("the ash court");

        context.set_normalizer(|raw: &str| Some(raw.trim().replace(' ', "-")));
        assert!(context
            .check_references(&entity, ReferencePolicy::Reject)
            .is_ok());

        context.reset_normalizer();
        assert!(context
            .check_references(&entity, ReferencePolicy::Reject)
            .is_err());
    }

    #[tokio::test]
    async fn test_file_system_swap_and_reset() {
        let (_fs, _backing, context) = setup();
        let other = Arc::new(MemoryFileSystem::new());
        other.insert("npcs/ember.md", EMBER.replace("Ember Thorn\n", "Ember Other\n"));

        context.set_file_system(other.clone());
        let document = context.load(Path::new("npcs/ember.md")).await.unwrap();
        assert_eq!(document.entity.name, "Ember Other");

        context.reset_file_system();
        let document = context.load(Path::new("npcs/ember.md")).await.unwrap();
        assert_eq!(document.entity.name, "Ember Thorn");
        assert_eq!(other.total_reads(), 1);
    }

    #[tokio::test]
    async fn test_render_body_uses_cached_attachments() {
        let (fs, _backing, context) = setup();
        fs.insert("npcs/sable.md", "---\nid: npc_sable_qu13\ntype: npc\nname: Sable\n---\n![[sable.png|Sable]]\n");
        let document = context.load(Path::new("npcs/sable.md")).await.unwrap();

        context.attachments().prime("sable.png", "blob:sable");
        let rendered = context.render_body(&document);
        assert!(matches!(
            &rendered.blocks[0],
            Block::Paragraph { inlines } if matches!(&inlines[0], Inline::Embed(embed) if embed.resolved_url.as_deref() == Some("blob:sable"))
        ));

        context.reset_attachment_caches();
        assert!(context.attachments().peek("sable.png").is_none());
    }

    #[test]
    fn test_from_config() {
        let config = VaultConfig::from_toml_str(
            "[vault]\nroot = \"/campaign\"\n[attachments]\nfolders = [\"art\"]\n[references]\npolicy = \"reject\"\n",
        )
        .unwrap();
        let context = VaultContext::from_config(&config, Arc::new(MemoryIndexBacking::new()));
        assert_eq!(context.reference_policy(), ReferencePolicy::Reject);
        assert_eq!(context.attachments().root(), Some(PathBuf::from("/campaign")));
    }
}
