//! Structural schemas for entity documents.
//!
//! A schema is a table of [`FieldSpec`]s per [`EntityKind`]. Validation walks the
//! decoded field map once and records every violation instead of stopping at the
//! first, so an editor can show all problems in a document together.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entities::{EntityId, EntityKind};
use crate::references::ReferenceField;

/// A single violated schema rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field, e.g. `alliances[1].faction`.
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Expected shape of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Text,
    TextList,
    /// A relationship reference to another entity.
    Reference,
    ReferenceList,
    Integer,
    /// Either text or a number.
    Scalar,
    Alliances,
    Knowledge,
    Objectives,
}

/// One known field of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub shape: FieldShape,
}

const fn field(name: &'static str, shape: FieldShape) -> FieldSpec {
    FieldSpec { name, shape }
}

/// Fields every kind shares, in header grouping order.
pub const COMMON_FIELDS: &[FieldSpec] = &[
    field("id", FieldShape::Text),
    field("type", FieldShape::Text),
    field("name", FieldShape::Text),
    field("aliases", FieldShape::TextList),
    field("summary", FieldShape::Text),
    field("tags", FieldShape::TextList),
    field("image", FieldShape::Text),
];

const NPC_FIELDS: &[FieldSpec] = &[
    field("role", FieldShape::Text),
    field("status", FieldShape::Text),
    field("location", FieldShape::Reference),
    field("alliances", FieldShape::Alliances),
    field("knowledge", FieldShape::Knowledge),
];

const QUEST_FIELDS: &[FieldSpec] = &[
    field("status", FieldShape::Text),
    field("giver", FieldShape::Reference),
    field("location", FieldShape::Reference),
    field("objectives", FieldShape::Objectives),
    field("rewards", FieldShape::TextList),
];

const LOCATION_FIELDS: &[FieldSpec] = &[
    field("region", FieldShape::Text),
    field("parent", FieldShape::Reference),
    field("inhabitants", FieldShape::ReferenceList),
];

const FACTION_FIELDS: &[FieldSpec] = &[
    field("leader", FieldShape::Reference),
    field("headquarters", FieldShape::Reference),
    field("allies", FieldShape::ReferenceList),
    field("rivals", FieldShape::ReferenceList),
    field("alliances", FieldShape::Alliances),
];

const MONSTER_FIELDS: &[FieldSpec] = &[
    field("challenge", FieldShape::Scalar),
    field("habitat", FieldShape::Text),
    field("abilities", FieldShape::TextList),
];

const ENCOUNTER_FIELDS: &[FieldSpec] = &[
    field("location", FieldShape::Reference),
    field("participants", FieldShape::ReferenceList),
    field("difficulty", FieldShape::Text),
];

const SESSION_FIELDS: &[FieldSpec] = &[
    field("number", FieldShape::Integer),
    field("date", FieldShape::Text),
    field("attendees", FieldShape::TextList),
    field("encounters", FieldShape::ReferenceList),
    field("knowledge", FieldShape::Knowledge),
];

/// Kind-specific fields, in header grouping order.
pub fn kind_fields(kind: EntityKind) -> &'static [FieldSpec] {
    match kind {
        EntityKind::Npc => NPC_FIELDS,
        EntityKind::Quest => QUEST_FIELDS,
        EntityKind::Location => LOCATION_FIELDS,
        EntityKind::Faction => FACTION_FIELDS,
        EntityKind::Monster => MONSTER_FIELDS,
        EntityKind::Encounter => ENCOUNTER_FIELDS,
        EntityKind::Session => SESSION_FIELDS,
    }
}

/// Known field names for `kind` (shared first), in header grouping order.
pub fn field_order(kind: Option<EntityKind>) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = COMMON_FIELDS.iter().map(|spec| spec.name).collect();
    if let Some(kind) = kind {
        names.extend(kind_fields(kind).iter().map(|spec| spec.name));
    }
    names
}

/// Validate a decoded field map against the schema selected by its `type`.
///
/// Returns an empty list when the map is valid.
pub fn validate_fields(fields: &Map<String, Value>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let kind = match fields.get("type") {
        None | Some(Value::Null) => {
            issues.push(ValidationIssue::new("type", "required field is missing"));
            None
        }
        Some(Value::String(name)) => {
            let kind = EntityKind::from_type_name(name);
            if kind.is_none() {
                issues.push(ValidationIssue::new(
                    "type",
                    format!("unknown entity type '{name}'"),
                ));
            }
            kind
        }
        Some(other) => {
            issues.push(ValidationIssue::new(
                "type",
                format!("expected text, found {}", describe(other)),
            ));
            None
        }
    };

    match fields.get("id") {
        None | Some(Value::Null) => {
            issues.push(ValidationIssue::new("id", "required field is missing"));
        }
        Some(Value::String(raw)) => match EntityId::parse(raw) {
            Ok(id) => {
                if let (Some(kind), Some(id_kind)) = (kind, id.kind()) {
                    if kind != id_kind {
                        issues.push(ValidationIssue::new(
                            "id",
                            format!(
                                "prefix '{}' does not match type '{}'",
                                id_kind.id_prefix(),
                                kind.as_str()
                            ),
                        ));
                    }
                }
            }
            Err(err) => issues.push(ValidationIssue::new("id", err.to_string())),
        },
        Some(other) => issues.push(ValidationIssue::new(
            "id",
            format!("expected text, found {}", describe(other)),
        )),
    }

    match fields.get("name") {
        None | Some(Value::Null) => {
            issues.push(ValidationIssue::new("name", "required field is missing"));
        }
        Some(Value::String(name)) if name.trim().is_empty() => {
            issues.push(ValidationIssue::new("name", "must not be empty"));
        }
        Some(Value::String(_)) => {}
        Some(other) => issues.push(ValidationIssue::new(
            "name",
            format!("expected text, found {}", describe(other)),
        )),
    }

    let specs = COMMON_FIELDS
        .iter()
        .skip(3)
        .chain(kind.map(kind_fields).unwrap_or_default());
    for spec in specs {
        if let Some(value) = fields.get(spec.name) {
            if !value.is_null() {
                check_shape(spec.name, spec.shape, value, &mut issues);
            }
        }
    }

    issues
}

/// Gather every relationship-reference value from a field map.
pub fn collect_references(kind: EntityKind, fields: &Map<String, Value>) -> Vec<ReferenceField> {
    let mut refs = Vec::new();
    for spec in kind_fields(kind) {
        let Some(value) = fields.get(spec.name) else {
            continue;
        };
        match (spec.shape, value) {
            (FieldShape::Reference, Value::String(raw)) => {
                refs.push(ReferenceField::new(spec.name, raw));
            }
            (FieldShape::ReferenceList, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::String(raw) = item {
                        refs.push(ReferenceField::new(format!("{}[{i}]", spec.name), raw));
                    }
                }
            }
            (FieldShape::Alliances, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(Value::String(raw)) = item.get("faction") {
                        refs.push(ReferenceField::new(
                            format!("{}[{i}].faction", spec.name),
                            raw,
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    refs
}

fn check_shape(path: &str, shape: FieldShape, value: &Value, issues: &mut Vec<ValidationIssue>) {
    match shape {
        FieldShape::Text | FieldShape::Reference => expect_text(path, value, issues),
        FieldShape::TextList | FieldShape::ReferenceList => {
            if let Some(items) = expect_list(path, value, issues) {
                for (i, item) in items.iter().enumerate() {
                    expect_text(&format!("{path}[{i}]"), item, issues);
                }
            }
        }
        FieldShape::Integer => {
            if !(value.is_i64() || value.is_u64()) {
                issues.push(ValidationIssue::new(
                    path,
                    format!("expected a whole number, found {}", describe(value)),
                ));
            }
        }
        FieldShape::Scalar => {
            if !(value.is_string() || value.is_number()) {
                issues.push(ValidationIssue::new(
                    path,
                    format!("expected text or a number, found {}", describe(value)),
                ));
            }
        }
        FieldShape::Alliances => {
            let Some(items) = expect_list(path, value, issues) else {
                return;
            };
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                let Some(entry) = expect_map(&item_path, item, issues) else {
                    continue;
                };
                require_text(&item_path, entry, "faction", issues);
                optional_text(&item_path, entry, "standing", issues);
                optional_text(&item_path, entry, "note", issues);
            }
        }
        FieldShape::Knowledge => {
            let Some(items) = expect_list(path, value, issues) else {
                return;
            };
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                let Some(block) = expect_map(&item_path, item, issues) else {
                    continue;
                };
                require_text(&item_path, block, "scope", issues);
                let facts_path = format!("{item_path}.facts");
                match block.get("facts") {
                    None | Some(Value::Null) => issues.push(ValidationIssue::new(
                        facts_path,
                        "required field is missing",
                    )),
                    Some(facts) => {
                        if let Some(facts) = expect_list(&facts_path, facts, issues) {
                            for (j, fact) in facts.iter().enumerate() {
                                expect_text(&format!("{facts_path}[{j}]"), fact, issues);
                            }
                        }
                    }
                }
            }
        }
        FieldShape::Objectives => {
            let Some(items) = expect_list(path, value, issues) else {
                return;
            };
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                match item {
                    Value::String(_) => {}
                    Value::Object(entry) => {
                        require_text(&item_path, entry, "text", issues);
                        match entry.get("done") {
                            None | Some(Value::Null) | Some(Value::Bool(_)) => {}
                            Some(other) => issues.push(ValidationIssue::new(
                                format!("{item_path}.done"),
                                format!("expected true or false, found {}", describe(other)),
                            )),
                        }
                    }
                    other => issues.push(ValidationIssue::new(
                        item_path,
                        format!("expected text or a mapping, found {}", describe(other)),
                    )),
                }
            }
        }
    }
}

fn expect_text(path: &str, value: &Value, issues: &mut Vec<ValidationIssue>) {
    if !value.is_string() {
        issues.push(ValidationIssue::new(
            path,
            format!("expected text, found {}", describe(value)),
        ));
    }
}

fn expect_list<'a>(
    path: &str,
    value: &'a Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        other => {
            issues.push(ValidationIssue::new(
                path,
                format!("expected a list, found {}", describe(other)),
            ));
            None
        }
    }
}

fn expect_map<'a>(
    path: &str,
    value: &'a Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        other => {
            issues.push(ValidationIssue::new(
                path,
                format!("expected a mapping, found {}", describe(other)),
            ));
            None
        }
    }
}

fn require_text(
    parent: &str,
    map: &Map<String, Value>,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let path = format!("{parent}.{key}");
    match map.get(key) {
        None | Some(Value::Null) => {
            issues.push(ValidationIssue::new(path, "required field is missing"));
        }
        Some(value) => expect_text(&path, value, issues),
    }
}

fn optional_text(
    parent: &str,
    map: &Map<String, Value>,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(value) = map.get(key) {
        if !value.is_null() {
            expect_text(&format!("{parent}.{key}"), value, issues);
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
