//! Entity definitions for the campaign vault.

mod components;
mod entity;

pub use components::*;
pub use entity::*;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::references::ID_GRAMMAR;

/// Kinds of entities a vault document can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Npc,
    Quest,
    Location,
    Faction,
    Monster,
    Encounter,
    Session,
}

impl EntityKind {
    /// Every kind, in listing order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Npc,
        EntityKind::Quest,
        EntityKind::Location,
        EntityKind::Faction,
        EntityKind::Monster,
        EntityKind::Encounter,
        EntityKind::Session,
    ];

    /// The value stored in a document's `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Npc => "npc",
            EntityKind::Quest => "quest",
            EntityKind::Location => "location",
            EntityKind::Faction => "faction",
            EntityKind::Monster => "monster",
            EntityKind::Encounter => "encounter",
            EntityKind::Session => "session",
        }
    }

    /// The leading segment of ids minted for this kind.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Location => "loc",
            other => other.as_str(),
        }
    }

    /// Look up a kind by its `type` field value (case-insensitive).
    pub fn from_type_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Look up a kind by an id prefix (case-insensitive).
    pub fn from_id_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.id_prefix().eq_ignore_ascii_case(prefix))
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_type_name(s).ok_or_else(|| IdError::UnknownKind(s.to_string()))
    }
}

/// Errors produced while parsing identifiers and kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("'{0}' does not match the <type>_<slug>_<suffix> identifier grammar")]
    Malformed(String),
    #[error("unknown entity type '{0}'")]
    UnknownKind(String),
}

/// Stable, globally unique identifier of an entity: `<type>_<slug>_<suffix>`.
///
/// Ids are assigned once and never change, even when the backing file is
/// renamed or moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Parse and canonicalize (lower-case) an identifier.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let trimmed = raw.trim();
        if ID_GRAMMAR.is_match(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(IdError::Malformed(raw.to_string()))
        }
    }

    /// Wrap a string without checking it against the grammar.
    ///
    /// Used for ids read from documents, which are validated by the schema
    /// before an entity is handed out.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Mint a new id for an entity of `kind` called `name`.
    pub fn generate(kind: EntityKind, name: &str) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
        Self(format!("{}_{}_{}", kind.id_prefix(), slugify(name), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The kind encoded in the id prefix, if the prefix is known.
    pub fn kind(&self) -> Option<EntityKind> {
        let (prefix, _) = self.0.split_once('_')?;
        EntityKind::from_id_prefix(prefix)
    }

    /// The human-readable middle segment.
    pub fn slug(&self) -> Option<&str> {
        let (_, rest) = self.0.split_once('_')?;
        let (slug, _) = rest.rsplit_once('_')?;
        Some(slug)
    }

    /// The random trailing segment.
    pub fn suffix(&self) -> Option<&str> {
        self.0.rsplit_once('_').map(|(_, suffix)| suffix)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reduce a display name to the `[a-z0-9-]+` slug alphabet.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}
