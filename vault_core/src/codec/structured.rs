//! The whole-file structured format: one JSON object per document.

use serde_json::{Map, Value};

/// Serialize `fields` with sorted keys, two-space indentation and a trailing newline.
pub fn to_canonical_json(fields: &Map<String, Value>) -> Result<String, serde_json::Error> {
    let mut text = serde_json::to_string_pretty(&sorted(Value::Object(fields.clone())))?;
    text.push('\n');
    Ok(text)
}

/// Rebuild every mapping with its keys in ascending order.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sorted(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}
