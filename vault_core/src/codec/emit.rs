//! Header block emitter.
//!
//! Output is deterministic: keys listed in `order` come first, then every other
//! key alphabetically; nested mappings are sorted. Strings that would read back
//! as something else are double-quoted, so emitting and re-parsing a value tree
//! yields the same tree.

use serde_json::{Map, Value};

use super::header::plain_scalar;

const INDENT: usize = 2;

/// Emit `fields` as header lines, each terminated by `\n`.
pub fn emit_header(fields: &Map<String, Value>, order: &[&str]) -> String {
    let mut out = String::new();
    for key in order {
        if let Some(value) = fields.get(*key) {
            emit_entry(&mut out, key, value, 0);
        }
    }
    for (key, value) in fields {
        if !order.contains(&key.as_str()) {
            emit_entry(&mut out, key, value, 0);
        }
    }
    out
}

fn emit_entry(out: &mut String, key: &str, value: &Value, indent: usize) {
    let pad = " ".repeat(indent);
    let key = emit_key(key);
    match value {
        Value::Object(map) if !map.is_empty() => {
            out.push_str(&format!("{pad}{key}:\n"));
            for (child_key, child) in map {
                emit_entry(out, child_key, child, indent + INDENT);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            out.push_str(&format!("{pad}{key}:\n"));
            for item in items {
                emit_item(out, item, indent + INDENT);
            }
        }
        Value::String(text) => match literal_block(text) {
            Some(indicator) => {
                out.push_str(&format!("{pad}{key}: {indicator}\n"));
                emit_block_lines(out, text, indent + INDENT);
            }
            None => out.push_str(&format!("{pad}{key}: {}\n", emit_scalar(value))),
        },
        other => out.push_str(&format!("{pad}{key}: {}\n", emit_scalar(other))),
    }
}

fn emit_item(out: &mut String, value: &Value, indent: usize) {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) if !map.is_empty() => {
            // First entry shares the line with the marker.
            let mut nested = String::new();
            for (key, child) in map {
                emit_entry(&mut nested, key, child, indent + INDENT);
            }
            out.push_str(&pad);
            out.push_str("- ");
            out.push_str(&nested[indent + INDENT..]);
        }
        Value::Array(items) if !items.is_empty() => {
            let mut nested = String::new();
            for item in items {
                emit_item(&mut nested, item, indent + INDENT);
            }
            out.push_str(&pad);
            out.push_str("- ");
            out.push_str(&nested[indent + INDENT..]);
        }
        Value::String(text) => match literal_block(text) {
            Some(indicator) => {
                out.push_str(&format!("{pad}- {indicator}\n"));
                emit_block_lines(out, text, indent + INDENT);
            }
            None => out.push_str(&format!("{pad}- {}\n", emit_scalar(value))),
        },
        other => out.push_str(&format!("{pad}- {}\n", emit_scalar(other))),
    }
}

/// The block indicator to use for a multi-line string, if it can be written as
/// a literal block without changing its value.
fn literal_block(text: &str) -> Option<&'static str> {
    if !text.contains('\n') || text.contains('\r') {
        return None;
    }
    let (content, indicator) = match text.strip_suffix('\n') {
        Some(content) if content.ends_with('\n') => return None,
        Some(content) => (content, "|"),
        None => (text, "|-"),
    };
    let mut lines = content.split('\n');
    let first = lines.next()?;
    if first.is_empty() || first.starts_with(char::is_whitespace) {
        return None;
    }
    let preserved = content
        .split('\n')
        .all(|line| line.is_empty() || !line.trim().is_empty());
    preserved.then_some(indicator)
}

fn emit_block_lines(out: &mut String, text: &str, indent: usize) {
    let pad = " ".repeat(indent);
    let content = text.strip_suffix('\n').unwrap_or(text);
    for line in content.split('\n') {
        if !line.is_empty() {
            out.push_str(&pad);
            out.push_str(line);
        }
        out.push('\n');
    }
}

fn emit_key(key: &str) -> String {
    if needs_quotes(key) || key.contains(':') {
        quote(key)
    } else {
        key.to_string()
    }
}

/// Render a scalar (or empty container) for the right-hand side of a line.
pub fn emit_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) if needs_quotes(text) => quote(text),
        Value::String(text) => text.clone(),
        Value::Array(_) => "[]".to_string(),
        Value::Object(_) => "{}".to_string(),
    }
}

/// Whether `text` must be quoted to read back as the same string.
fn needs_quotes(text: &str) -> bool {
    let Some(first) = text.chars().next() else {
        return true;
    };
    if !matches!(plain_scalar(text), Value::String(ref parsed) if parsed == text) {
        return true;
    }
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        return true;
    }
    if "-?:,[]{}#&*!|>'\"%@`".contains(first) {
        return true;
    }
    text.contains(": ")
        || text.ends_with(':')
        || text.contains(" #")
        || text.chars().any(char::is_control)
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            ch if ch.is_control() => out.push_str(&format!("\\u{:04x}", ch as u32)),
            ch => out.push(ch),
        }
    }
    out.push('"');
    out
}
