//! Parsing of the bulk-scan payload.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::IndexEntry;

/// A parsed bulk scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkIndex {
    pub version: Option<u64>,
    pub generated_at: Option<String>,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    version: Option<u64>,
    #[serde(default)]
    generated_at: Option<String>,
    entities: Map<String, Value>,
}

/// Parse a bulk payload.
///
/// A payload that is not JSON, or lacks the `entities` mapping, is an error.
/// Individual entries that are malformed, or whose `id` disagrees with their key,
/// are skipped with a warning so one bad row cannot empty the index.
pub fn parse_bulk_payload(raw: &str) -> Result<BulkIndex, serde_json::Error> {
    let payload: RawPayload = serde_json::from_str(raw)?;

    let mut entries = Vec::with_capacity(payload.entities.len());
    for (key, value) in payload.entities {
        let key = canonical_key(&key);
        let mut entry: IndexEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(id = %key, error = %err, "skipping malformed index entry");
                continue;
            }
        };
        if entry.id.is_empty() {
            entry.id = key.clone();
        } else if canonical_key(&entry.id) != key {
            warn!(id = %key, entry_id = %entry.id, "skipping index entry filed under another id");
            continue;
        }
        entry.id = key;
        entries.push(entry);
    }

    Ok(BulkIndex {
        version: payload.version,
        generated_at: payload.generated_at,
        entries,
    })
}

/// Ids compare case-insensitively; the index stores them lower-cased.
pub fn canonical_key(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_payload() {
        let raw = r#"{
            "version": 3,
            "generated_at": "2026-10-01T12:00:00Z",
            "entities": {
                "npc_ember_fl4m3": {
                    "id": "npc_ember_fl4m3",
                    "type": "npc",
                    "name": "Ember",
                    "path": "npcs/ember.md",
                    "mtime": 1700000000000.5,
                    "metadata": {"aliases": ["Flame"]}
                },
                "LOC_FORGE_AB12": {
                    "type": "location",
                    "name": "The Forge",
                    "path": "places/forge.md"
                }
            }
        }"#;
        let bulk = parse_bulk_payload(raw).unwrap();
        assert_eq!(bulk.version, Some(3));
        assert_eq!(bulk.generated_at.as_deref(), Some("2026-10-01T12:00:00Z"));
        assert_eq!(bulk.entries.len(), 2);

        let forge = bulk
            .entries
            .iter()
            .find(|e| e.id == "loc_forge_ab12")
            .unwrap();
        assert_eq!(forge.path, PathBuf::from("places/forge.md"));
        assert_eq!(forge.mtime, 0.0);
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let raw = r#"{
            "version": 1,
            "entities": {
                "npc_a_abcd": {"id": "npc_a_abcd", "type": "npc", "name": "A", "path": "a.md"},
                "npc_b_abcd": {"id": "npc_b_abcd", "type": "npc"},
                "npc_c_abcd": {"id": "npc_z_abcd", "type": "npc", "name": "C", "path": "c.md"}
            }
        }"#;
        let bulk = parse_bulk_payload(raw).unwrap();
        assert_eq!(bulk.entries.len(), 1);
        assert_eq!(bulk.entries[0].id, "npc_a_abcd");
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(parse_bulk_payload("not json").is_err());
        assert!(parse_bulk_payload(r#"{"version": 1}"#).is_err());
        assert!(parse_bulk_payload(r#"{"entities": []}"#).is_err());
    }
}
