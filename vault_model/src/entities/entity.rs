//! The typed entity union.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{Alliance, EntityId, EntityKind, Objective, ScopedKnowledge};
use crate::references::ReferenceField;
use crate::schema::{collect_references, kind_fields, validate_fields, ValidationIssue};

/// One identified campaign record.
///
/// Shared fields are stored directly, kind-specific fields live in [`EntityData`],
/// and anything the schema does not recognize is kept in `extra` so that a
/// decode/encode cycle never drops user data.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub aliases: Option<Vec<String>>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub image: Option<String>,

    pub data: EntityData,

    /// Unrecognized top-level fields, plus known fields written as an explicit
    /// null so they are emitted again as written.
    pub extra: Map<String, Value>,
}

impl Entity {
    /// Create a new entity of `kind` with a freshly minted id.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: EntityId::generate(kind, &name),
            name,
            aliases: None,
            summary: None,
            tags: None,
            image: None,
            data: EntityData::empty(kind),
            extra: Map::new(),
        }
    }

    /// Replace the id.
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    /// Add an alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.get_or_insert_with(Vec::new).push(alias.into());
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(Vec::new).push(tag.into());
        self
    }

    /// Set the summary line.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.data.kind()
    }

    /// Build an entity from a decoded field map.
    ///
    /// Every schema violation is reported; no partially built entity escapes.
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self, Vec<ValidationIssue>> {
        let issues = validate_fields(&fields);
        if !issues.is_empty() {
            return Err(issues);
        }

        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .and_then(EntityKind::from_type_name)
            .ok_or_else(|| vec![ValidationIssue::new("type", "missing entity type")])?;
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .and_then(|raw| EntityId::parse(raw).ok())
            .ok_or_else(|| vec![ValidationIssue::new("id", "missing entity id")])?;
        let name = match fields.remove("name") {
            Some(Value::String(name)) => name,
            _ => return Err(vec![ValidationIssue::new("name", "missing entity name")]),
        };
        fields.remove("id");
        fields.remove("type");

        let mut issues = Vec::new();
        let aliases = take_optional(&mut fields, "aliases", &mut issues);
        let summary = take_optional(&mut fields, "summary", &mut issues);
        let tags = take_optional(&mut fields, "tags", &mut issues);
        let image = take_optional(&mut fields, "image", &mut issues);

        let mut kind_map = Map::new();
        for spec in kind_fields(kind) {
            if let Some(value) = take_set(&mut fields, spec.name) {
                kind_map.insert(spec.name.to_string(), value);
            }
        }
        let data = match EntityData::from_map(kind, kind_map) {
            Ok(data) => data,
            Err(err) => {
                issues.push(ValidationIssue::new(kind.as_str(), err.to_string()));
                EntityData::empty(kind)
            }
        };
        if !issues.is_empty() {
            return Err(issues);
        }

        Ok(Self {
            id,
            name,
            aliases,
            summary,
            tags,
            image,
            data,
            extra: fields,
        })
    }

    /// Flatten the entity back into a field map.
    ///
    /// Known fields take precedence over same-named keys in `extra`.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(self.id.to_string()));
        fields.insert(
            "type".to_string(),
            Value::String(self.kind().as_str().to_string()),
        );
        fields.insert("name".to_string(), Value::String(self.name.clone()));
        insert_optional(&mut fields, "aliases", &self.aliases);
        insert_optional(&mut fields, "summary", &self.summary);
        insert_optional(&mut fields, "tags", &self.tags);
        insert_optional(&mut fields, "image", &self.image);
        fields.extend(self.data.to_map());
        for (key, value) in &self.extra {
            fields.entry(key.clone()).or_insert_with(|| value.clone());
        }
        fields
    }

    /// Every relationship-reference field with its raw value.
    pub fn references(&self) -> Vec<ReferenceField> {
        collect_references(self.kind(), &self.to_fields())
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_fields().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Entity::from_fields(fields).map_err(|issues| {
            let joined: Vec<String> = issues.iter().map(ToString::to_string).collect();
            D::Error::custom(joined.join("; "))
        })
    }
}

fn take_optional<T: serde::de::DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<T> {
    let value = take_set(fields, key)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            issues.push(ValidationIssue::new(key, err.to_string()));
            None
        }
    }
}

/// Remove `key` unless it is absent or an explicit null; nulls stay behind.
pub(crate) fn take_set(fields: &mut Map<String, Value>, key: &str) -> Option<Value> {
    if fields.get(key).map_or(true, Value::is_null) {
        return None;
    }
    fields.remove(key)
}

fn insert_optional<T: Serialize>(fields: &mut Map<String, Value>, key: &str, value: &Option<T>) {
    if let Some(value) = value {
        if let Ok(value) = serde_json::to_value(value) {
            fields.insert(key.to_string(), value);
        }
    }
}

fn object_of<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Kind-specific payload; one variant per [`EntityKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntityData {
    Npc(NpcData),
    Quest(QuestData),
    Location(LocationData),
    Faction(FactionData),
    Monster(MonsterData),
    Encounter(EncounterData),
    Session(SessionData),
}

impl EntityData {
    /// A payload of `kind` with every field unset.
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Npc => EntityData::Npc(NpcData::default()),
            EntityKind::Quest => EntityData::Quest(QuestData::default()),
            EntityKind::Location => EntityData::Location(LocationData::default()),
            EntityKind::Faction => EntityData::Faction(FactionData::default()),
            EntityKind::Monster => EntityData::Monster(MonsterData::default()),
            EntityKind::Encounter => EntityData::Encounter(EncounterData::default()),
            EntityKind::Session => EntityData::Session(SessionData::default()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::Npc(_) => EntityKind::Npc,
            EntityData::Quest(_) => EntityKind::Quest,
            EntityData::Location(_) => EntityKind::Location,
            EntityData::Faction(_) => EntityKind::Faction,
            EntityData::Monster(_) => EntityKind::Monster,
            EntityData::Encounter(_) => EntityKind::Encounter,
            EntityData::Session(_) => EntityKind::Session,
        }
    }

    /// Deserialize the payload of `kind` from its known fields.
    pub fn from_map(kind: EntityKind, map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let value = Value::Object(map);
        Ok(match kind {
            EntityKind::Npc => EntityData::Npc(serde_json::from_value(value)?),
            EntityKind::Quest => EntityData::Quest(serde_json::from_value(value)?),
            EntityKind::Location => EntityData::Location(serde_json::from_value(value)?),
            EntityKind::Faction => EntityData::Faction(serde_json::from_value(value)?),
            EntityKind::Monster => EntityData::Monster(serde_json::from_value(value)?),
            EntityKind::Encounter => EntityData::Encounter(serde_json::from_value(value)?),
            EntityKind::Session => EntityData::Session(serde_json::from_value(value)?),
        })
    }

    /// Serialize the payload into its set fields.
    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            EntityData::Npc(data) => object_of(data),
            EntityData::Quest(data) => object_of(data),
            EntityData::Location(data) => object_of(data),
            EntityData::Faction(data) => object_of(data),
            EntityData::Monster(data) => object_of(data),
            EntityData::Encounter(data) => object_of(data),
            EntityData::Session(data) => object_of(data),
        }
    }
}

/// A non-player character.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NpcData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Reference to the location the character is usually found at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliances: Option<Vec<Alliance>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<Vec<ScopedKnowledge>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub giver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objectives: Option<Vec<Objective>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Reference to the enclosing location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inhabitants: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FactionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rivals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliances: Option<Vec<Alliance>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonsterData {
    /// Challenge rating, written either as a number or as text such as "1/4".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habitat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abilities: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EncounterData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

/// A played session log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<Vec<ScopedKnowledge>>,
}
