//! Nested field structures shared by several entity kinds.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::entity::take_set;

/// Membership of an entity in a faction.
#[derive(Debug, Clone, PartialEq)]
pub struct Alliance {
    /// Relationship reference to the faction.
    pub faction: String,
    pub standing: Option<String>,
    pub note: Option<String>,

    /// Keys the schema does not know about, and known keys written as null.
    pub extra: Map<String, Value>,
}

impl Serialize for Alliance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = self.extra.clone();
        map.insert("faction".to_string(), Value::String(self.faction.clone()));
        put(&mut map, "standing", &self.standing);
        put(&mut map, "note", &self.note);
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Alliance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let mut build = || -> Result<Self, serde_json::Error> {
            let faction = take_set(&mut map, "faction")
                .ok_or_else(|| serde_json::Error::missing_field("faction"))?;
            Ok(Self {
                faction: serde_json::from_value(faction)?,
                standing: take_parsed(&mut map, "standing")?,
                note: take_parsed(&mut map, "note")?,
                extra: std::mem::take(&mut map),
            })
        };
        build().map_err(D::Error::custom)
    }
}

impl Alliance {
    /// Create an alliance with the given faction reference.
    pub fn new(faction: impl Into<String>) -> Self {
        Self {
            faction: faction.into(),
            standing: None,
            note: None,
            extra: Map::new(),
        }
    }

    /// Set the standing within the faction.
    pub fn with_standing(mut self, standing: impl Into<String>) -> Self {
        self.standing = Some(standing.into());
        self
    }
}

/// Knowledge an entity holds, scoped to who may learn it (e.g. "public", "secret").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedKnowledge {
    pub scope: String,
    pub facts: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScopedKnowledge {
    /// Create a knowledge block for `scope`.
    pub fn new(scope: impl Into<String>, facts: impl IntoIterator<Item = String>) -> Self {
        Self {
            scope: scope.into(),
            facts: facts.into_iter().collect(),
            extra: Map::new(),
        }
    }
}

/// A quest objective, either a bare line of text or a tracked item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Objective {
    Plain(String),
    Tracked(TrackedObjective),
}

impl Objective {
    /// The objective text regardless of representation.
    pub fn text(&self) -> &str {
        match self {
            Objective::Plain(text) => text,
            Objective::Tracked(tracked) => &tracked.text,
        }
    }

    /// Whether the objective is marked done. Plain objectives never are.
    pub fn is_done(&self) -> bool {
        match self {
            Objective::Plain(_) => false,
            Objective::Tracked(tracked) => tracked.done.unwrap_or(false),
        }
    }
}

/// An objective with completion tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObjective {
    pub text: String,
    pub done: Option<bool>,

    pub extra: Map<String, Value>,
}

impl Serialize for TrackedObjective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = self.extra.clone();
        map.insert("text".to_string(), Value::String(self.text.clone()));
        put(&mut map, "done", &self.done);
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TrackedObjective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let mut build = || -> Result<Self, serde_json::Error> {
            let text = take_set(&mut map, "text")
                .ok_or_else(|| serde_json::Error::missing_field("text"))?;
            Ok(Self {
                text: serde_json::from_value(text)?,
                done: take_parsed(&mut map, "done")?,
                extra: std::mem::take(&mut map),
            })
        };
        build().map_err(D::Error::custom)
    }
}

/// Set `key` when `value` is present; an absent value leaves `map` untouched.
fn put<T: Into<Value> + Clone>(map: &mut Map<String, Value>, key: &str, value: &Option<T>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value.clone().into());
    }
}

/// Parse `key` when it holds a value; explicit nulls stay in `map`.
fn take_parsed<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, serde_json::Error> {
    take_set(map, key).map(serde_json::from_value).transpose()
}
