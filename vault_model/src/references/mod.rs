//! Relationship references - string fields that name another entity by id.
//!
//! Normalization is a pluggable function rather than a stateful component. The
//! default accepts the fixed identifier grammar; deployments and tests swap in a
//! different rule (or a live existence check) through [`NormalizerHandle`].

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

/// The identifier grammar, matched case-insensitively over ASCII only.
pub static ID_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i-u)^(npc|quest|loc|faction|monster|encounter|session)_[a-z0-9-]+_[a-z0-9]{4,6}$")
        .unwrap()
});

/// Turns a raw field value into a canonical entity id, or rejects it with `None`.
///
/// Implementations must never panic on arbitrary input; what to do with a
/// rejected value is the caller's decision.
pub trait ReferenceNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> Option<String>;
}

impl<F> ReferenceNormalizer for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn normalize(&self, raw: &str) -> Option<String> {
        self(raw)
    }
}

/// The default normalizer: the fixed identifier grammar, folded to lower case.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGrammarNormalizer;

impl ReferenceNormalizer for IdGrammarNormalizer {
    fn normalize(&self, raw: &str) -> Option<String> {
        normalize_reference(raw)
    }
}

/// Normalize against the fixed identifier grammar.
///
/// Surrounding whitespace is ignored and a `[[id]]` or `[[id|label]]` wrapper is
/// unwrapped before matching.
pub fn normalize_reference(raw: &str) -> Option<String> {
    let mut candidate = raw.trim();
    if let Some(inner) = candidate
        .strip_prefix("[[")
        .and_then(|rest| rest.strip_suffix("]]"))
    {
        candidate = inner.split('|').next().unwrap_or(inner).trim();
    }
    if ID_GRAMMAR.is_match(candidate) {
        Some(candidate.to_ascii_lowercase())
    } else {
        None
    }
}

/// Swappable slot holding the active normalizer.
///
/// Clones share the same slot.
#[derive(Clone)]
pub struct NormalizerHandle {
    slot: Arc<RwLock<Arc<dyn ReferenceNormalizer>>>,
}

impl NormalizerHandle {
    /// Create a handle holding the default grammar normalizer.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(Arc::new(IdGrammarNormalizer))),
        }
    }

    /// Install a different normalizer.
    pub fn configure(&self, normalizer: impl ReferenceNormalizer + 'static) {
        *self.slot.write() = Arc::new(normalizer);
    }

    /// Restore the default grammar normalizer.
    pub fn reset(&self) {
        *self.slot.write() = Arc::new(IdGrammarNormalizer);
    }

    pub fn current(&self) -> Arc<dyn ReferenceNormalizer> {
        self.slot.read().clone()
    }

    pub fn normalize(&self, raw: &str) -> Option<String> {
        self.current().normalize(raw)
    }
}

impl Default for NormalizerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NormalizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizerHandle").finish_non_exhaustive()
    }
}

/// A field playing the relationship-reference role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceField {
    /// Dotted path of the field, e.g. `alliances[0].faction`.
    pub field: String,
    pub value: String,
}

impl ReferenceField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// What to do with a reference the normalizer rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// Refuse the document.
    Reject,
    /// Keep the document and log the bad reference.
    #[default]
    Warn,
    /// Keep the value untouched without comment.
    #[serde(rename = "store")]
    StoreAsIs,
}

/// Outcome of normalizing every reference of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceReport {
    /// Accepted references, values in canonical form.
    pub accepted: Vec<ReferenceField>,
    /// Rejected references, values as written.
    pub rejected: Vec<ReferenceField>,
}

impl ReferenceReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Run every reference through `normalizer`.
pub fn check_references(
    refs: impl IntoIterator<Item = ReferenceField>,
    normalizer: &dyn ReferenceNormalizer,
) -> ReferenceReport {
    let mut report = ReferenceReport::default();
    for reference in refs {
        match normalizer.normalize(&reference.value) {
            Some(canonical) => report
                .accepted
                .push(ReferenceField::new(reference.field, canonical)),
            None => report.rejected.push(reference),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_folds() {
        assert_eq!(
            normalize_reference("NPC_Ember_FL4M3"),
            Some("npc_ember_fl4m3".to_string())
        );
        assert_eq!(
            normalize_reference("  loc_old-mill_ab12 "),
            Some("loc_old-mill_ab12".to_string())
        );
    }

    #[test]
    fn test_normalize_unwraps_wikilinks() {
        assert_eq!(
            normalize_reference("[[faction_ash_ab12|The Ash Court]]"),
            Some("faction_ash_ab12".to_string())
        );
    }

    #[test]
    fn test_normalize_rejects_unicode_case_folds() {
        // KELVIN SIGN and LONG S fold to ASCII letters under Unicode rules.
        assert_eq!(normalize_reference("npc_\u{212A}ey_abcd"), None);
        assert_eq!(normalize_reference("npc_\u{17F}able_abcd"), None);
        assert_eq!(normalize_reference("npc_sable_ab\u{212A}d"), None);
        assert_eq!(normalize_reference("NPC_Key_ABCD"), Some("npc_key_abcd".to_string()));
    }

    #[test]
    fn test_normalize_rejects() {
        assert_eq!(normalize_reference(""), None);
        assert_eq!(normalize_reference("Ember Thorn"), None);
        assert_eq!(normalize_reference("item_sword_ab12"), None);
        assert_eq!(normalize_reference("npc_ember_ab"), None);
        assert_eq!(normalize_reference("npc_ember thorn_ab12"), None);
    }

    #[test]
    fn test_handle_configure_and_reset() {
        let handle = NormalizerHandle::new();
        assert_eq!(handle.normalize("Ember"), None);

        handle.configure(|raw: &str| Some(raw.to_uppercase()));
        assert_eq!(handle.normalize("Ember"), Some("EMBER".to_string()));

        let shared = handle.clone();
        shared.reset();
        assert_eq!(handle.normalize("Ember"), None);
        assert_eq!(
            handle.normalize("npc_ember_fl4m3"),
            Some("npc_ember_fl4m3".to_string())
        );
    }

    #[test]
    fn test_check_references() {
        let report = check_references(
            vec![
                ReferenceField::new("leader", "NPC_Sable_QU13"),
                ReferenceField::new("allies[0]", "the iron guild"),
            ],
            &IdGrammarNormalizer,
        );
        assert_eq!(
            report.accepted,
            vec![ReferenceField::new("leader", "npc_sable_qu13")]
        );
        assert_eq!(report.rejected.len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_policy_names() {
        let policy: ReferencePolicy = serde_json::from_str("\"store\"").unwrap();
        assert_eq!(policy, ReferencePolicy::StoreAsIs);
        assert_eq!(ReferencePolicy::default(), ReferencePolicy::Warn);
    }
}
