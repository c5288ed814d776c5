//! Header block parser.
//!
//! Parses the documented subset of the nested key/value syntax used between the
//! header delimiters into a [`serde_json::Value`] tree:
//!
//! - `key: value` mappings, nested by two-space (or any consistent) indentation
//! - block lists with `- ` markers, including lists of mappings and `- - x`
//! - flow lists `[a, "b, c"]` and flow mappings `{k: v}`
//! - double-quoted (with escapes) and single-quoted scalars
//! - booleans, integers, floats, `null` / `~` / empty values
//! - literal (`|`) and folded (`>`) block scalars with `-` / `+` chomping
//! - full-line and trailing `#` comments
//!
//! The parser is a state machine over a stack of open containers keyed by
//! indentation. Each significant line either opens a child container, closes
//! containers it is dedented past, or fills the container on top of the stack.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// A syntax error inside the header block. `line` is 1-based within the block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct HeaderError {
    pub line: usize,
    pub message: String,
}

fn error(line: usize, message: impl Into<String>) -> HeaderError {
    HeaderError {
        line,
        message: message.into(),
    }
}

/// Parse a header block (the text between the delimiters).
///
/// An empty block yields an empty mapping.
pub fn parse_header(text: &str) -> Result<Value, HeaderError> {
    let raw: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    HeaderParser {
        raw,
        stack: Vec::new(),
        scalar_root: None,
    }
    .run()
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    indent: usize,
    content: &'a str,
}

#[derive(Debug)]
enum Container {
    /// `pending` holds a key whose value is the next, deeper block.
    Map {
        map: Map<String, Value>,
        pending: Option<String>,
    },
    /// `pending` marks a bare `-` whose value is the next, deeper block.
    List { items: Vec<Value>, pending: bool },
}

#[derive(Debug)]
struct Frame {
    indent: usize,
    container: Container,
}

impl Frame {
    fn map(indent: usize) -> Self {
        Self {
            indent,
            container: Container::Map {
                map: Map::new(),
                pending: None,
            },
        }
    }

    fn list(indent: usize) -> Self {
        Self {
            indent,
            container: Container::List {
                items: Vec::new(),
                pending: false,
            },
        }
    }

    fn into_value(self) -> Value {
        match self.container {
            Container::Map { mut map, pending } => {
                if let Some(key) = pending {
                    map.insert(key, Value::Null);
                }
                Value::Object(map)
            }
            Container::List { mut items, pending } => {
                if pending {
                    items.push(Value::Null);
                }
                Value::Array(items)
            }
        }
    }
}

/// What the top of the stack is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopState {
    MapPending,
    MapReady,
    ListPending,
    ListReady,
}

struct HeaderParser<'a> {
    raw: Vec<&'a str>,
    stack: Vec<Frame>,
    scalar_root: Option<Value>,
}

impl<'a> HeaderParser<'a> {
    fn run(mut self) -> Result<Value, HeaderError> {
        let mut index = 0;
        while index < self.raw.len() {
            index = match self.significant(index)? {
                Some(line) => self.dispatch(line, index)?,
                None => index + 1,
            };
        }
        self.finish()
    }

    /// The line at `index`, or `None` for blank and comment lines.
    fn significant(&self, index: usize) -> Result<Option<Line<'a>>, HeaderError> {
        let raw = self.raw[index];
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        let indent = raw.len() - raw.trim_start_matches(' ').len();
        if raw[indent..].starts_with('\t') {
            return Err(error(index + 1, "tabs are not allowed for indentation"));
        }
        Ok(Some(Line {
            number: index + 1,
            indent,
            content: raw[indent..].trim_end(),
        }))
    }

    fn top_state(&self) -> Option<TopState> {
        self.stack.last().map(|frame| match &frame.container {
            Container::Map { pending: Some(_), .. } => TopState::MapPending,
            Container::Map { pending: None, .. } => TopState::MapReady,
            Container::List { pending: true, .. } => TopState::ListPending,
            Container::List { pending: false, .. } => TopState::ListReady,
        })
    }

    fn top_indent(&self) -> usize {
        self.stack.last().map_or(0, |frame| frame.indent)
    }

    /// Process one significant line; returns the index of the next raw line.
    fn dispatch(&mut self, mut line: Line<'a>, index: usize) -> Result<usize, HeaderError> {
        if self.scalar_root.is_some() {
            return Err(error(line.number, "unexpected content after a scalar header"));
        }
        if self.stack.is_empty() {
            if is_dash(line.content) {
                self.stack.push(Frame::list(line.indent));
            } else if split_key(line.content).is_some() {
                self.stack.push(Frame::map(line.indent));
            } else {
                self.scalar_root = Some(parse_inline_value(line.content, line.number)?);
                return Ok(index + 1);
            }
        }

        loop {
            let top_indent = self.top_indent();
            if line.indent < top_indent {
                if self.stack.len() == 1 {
                    return Err(error(
                        line.number,
                        "line is indented less than the start of the header",
                    ));
                }
                self.close_top(line.number)?;
                continue;
            }
            let dash = is_dash(line.content);

            match self.top_state() {
                Some(TopState::MapPending) => {
                    if line.indent > top_indent || (line.indent == top_indent && dash) {
                        self.open_child(line.indent, dash);
                    } else {
                        self.resolve_pending_null();
                    }
                }
                Some(TopState::MapReady) => {
                    if line.indent > top_indent {
                        return Err(error(line.number, "unexpected indentation"));
                    }
                    if dash {
                        return Err(error(line.number, "list item where a key was expected"));
                    }
                    let (key, rest) = split_key(line.content)
                        .ok_or_else(|| error(line.number, "expected `key: value`"))?;
                    return self.assign_key(key, rest, line, index);
                }
                Some(TopState::ListPending) => {
                    if line.indent > top_indent {
                        self.open_child(line.indent, dash);
                    } else {
                        self.resolve_pending_null();
                    }
                }
                Some(TopState::ListReady) => {
                    if line.indent > top_indent {
                        return Err(error(line.number, "unexpected indentation"));
                    }
                    if !dash {
                        if self.stack.len() == 1 {
                            return Err(error(line.number, "expected a list item"));
                        }
                        self.close_top(line.number)?;
                        continue;
                    }

                    let item = line.content[1..].trim_start();
                    let item_indent = line.indent + (line.content.len() - item.len());
                    if item.is_empty() {
                        self.set_list_pending();
                        return Ok(index + 1);
                    }
                    if is_dash(item) {
                        self.stack.push(Frame::list(item_indent));
                    } else if let Some(style) = block_style(strip_comment(item).trim()) {
                        let (value, next) = self.block_scalar(index, top_indent, style);
                        self.push_item(value);
                        return Ok(next);
                    } else if split_key(item).is_some() {
                        self.stack.push(Frame::map(item_indent));
                    } else {
                        let value = parse_inline_value(item, line.number)?;
                        self.push_item(value);
                        return Ok(index + 1);
                    }
                    line = Line {
                        number: line.number,
                        indent: item_indent,
                        content: item,
                    };
                }
                None => return Err(error(line.number, "header parser lost its state")),
            }
        }
    }

    fn assign_key(
        &mut self,
        key: String,
        rest: &str,
        line: Line<'a>,
        index: usize,
    ) -> Result<usize, HeaderError> {
        let frame_indent = self.top_indent();
        let rest = strip_comment(rest).trim();

        let (value, next) = if rest.is_empty() {
            (None, index + 1)
        } else if let Some(style) = block_style(rest) {
            let (value, next) = self.block_scalar(index, frame_indent, style);
            (Some(value), next)
        } else {
            (Some(parse_inline_value(rest, line.number)?), index + 1)
        };

        let Some(Frame {
            container: Container::Map { map, pending },
            ..
        }) = self.stack.last_mut()
        else {
            return Err(error(line.number, "header parser lost its state"));
        };
        if map.contains_key(&key) {
            return Err(error(line.number, format!("duplicate key '{key}'")));
        }
        match value {
            Some(value) => {
                map.insert(key, value);
            }
            None => *pending = Some(key),
        }
        Ok(next)
    }

    fn open_child(&mut self, indent: usize, dash: bool) {
        let frame = if dash {
            Frame::list(indent)
        } else {
            Frame::map(indent)
        };
        self.stack.push(frame);
    }

    fn resolve_pending_null(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            match &mut frame.container {
                Container::Map { map, pending } => {
                    if let Some(key) = pending.take() {
                        map.insert(key, Value::Null);
                    }
                }
                Container::List { items, pending } => {
                    if *pending {
                        items.push(Value::Null);
                        *pending = false;
                    }
                }
            }
        }
    }

    fn set_list_pending(&mut self) {
        if let Some(Frame {
            container: Container::List { pending, .. },
            ..
        }) = self.stack.last_mut()
        {
            *pending = true;
        }
    }

    fn push_item(&mut self, value: Value) {
        if let Some(Frame {
            container: Container::List { items, .. },
            ..
        }) = self.stack.last_mut()
        {
            items.push(value);
        }
    }

    /// Pop the top container and hand its value to its parent.
    fn close_top(&mut self, line: usize) -> Result<(), HeaderError> {
        let Some(frame) = self.stack.pop() else {
            return Err(error(line, "header parser lost its state"));
        };
        let value = frame.into_value();
        match self.stack.last_mut().map(|parent| &mut parent.container) {
            Some(Container::Map { map, pending }) => match pending.take() {
                Some(key) => {
                    map.insert(key, value);
                    Ok(())
                }
                None => Err(error(line, "nested block without a key")),
            },
            Some(Container::List { items, pending }) => {
                items.push(value);
                *pending = false;
                Ok(())
            }
            None => Err(error(line, "header parser lost its state")),
        }
    }

    fn finish(mut self) -> Result<Value, HeaderError> {
        if let Some(value) = self.scalar_root.take() {
            return Ok(value);
        }
        let last_line = self.raw.len();
        while self.stack.len() > 1 {
            self.close_top(last_line)?;
        }
        Ok(self
            .stack
            .pop()
            .map_or_else(|| Value::Object(Map::new()), Frame::into_value))
    }

    /// Consume the lines of a block scalar that follows raw line `index`.
    ///
    /// Content lines are those indented deeper than `parent_indent`; blank lines
    /// inside the block are kept. Returns the value and the next raw index.
    fn block_scalar(
        &self,
        index: usize,
        parent_indent: usize,
        style: BlockStyle,
    ) -> (Value, usize) {
        let mut next = index + 1;
        let mut lines: Vec<&str> = Vec::new();
        while next < self.raw.len() {
            let raw = self.raw[next];
            if raw.trim().is_empty() {
                lines.push("");
                next += 1;
                continue;
            }
            let indent = raw.len() - raw.trim_start_matches(' ').len();
            if indent <= parent_indent {
                break;
            }
            lines.push(raw);
            next += 1;
        }

        let content_indent = lines
            .iter()
            .find(|line| !line.is_empty())
            .map_or(0, |line| line.len() - line.trim_start_matches(' ').len());
        let mut text_lines: Vec<&str> = lines
            .iter()
            .map(|line| {
                let leading = line.len() - line.trim_start_matches(' ').len();
                &line[leading.min(content_indent)..]
            })
            .collect();

        let mut trailing = 0;
        while text_lines.last().is_some_and(|line| line.is_empty()) {
            text_lines.pop();
            trailing += 1;
        }

        let mut text = if style.folded {
            fold_lines(&text_lines)
        } else {
            text_lines.join("\n")
        };
        if !text_lines.is_empty() {
            match style.chomp {
                Chomp::Strip => {}
                Chomp::Clip => text.push('\n'),
                Chomp::Keep => {
                    text.push('\n');
                    text.push_str(&"\n".repeat(trailing));
                }
            }
        }
        (Value::String(text), next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chomp {
    Strip,
    Clip,
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockStyle {
    folded: bool,
    chomp: Chomp,
}

fn block_style(indicator: &str) -> Option<BlockStyle> {
    let mut chars = indicator.chars();
    let folded = match chars.next()? {
        '|' => false,
        '>' => true,
        _ => return None,
    };
    let chomp = match chars.as_str() {
        "" => Chomp::Clip,
        "-" => Chomp::Strip,
        "+" => Chomp::Keep,
        _ => return None,
    };
    Some(BlockStyle { folded, chomp })
}

fn fold_lines(lines: &[&str]) -> String {
    let mut text = String::new();
    let mut previous_blank = true;
    for line in lines {
        if line.is_empty() {
            text.push('\n');
            previous_blank = true;
        } else {
            if !previous_blank {
                text.push(' ');
            }
            text.push_str(line);
            previous_blank = false;
        }
    }
    text
}

fn is_dash(content: &str) -> bool {
    content == "-" || content.starts_with("- ")
}

/// Split `key: rest` when `content` starts with a mapping key.
pub(crate) fn split_key(content: &str) -> Option<(String, &str)> {
    if content.starts_with('"') || content.starts_with('\'') {
        let (key, rest) = parse_quoted(content, 0).ok()?;
        let rest = rest.trim_start().strip_prefix(':')?;
        if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
            return None;
        }
        return Some((key, rest.trim()));
    }
    if content.starts_with(['[', '{', '#']) || is_dash(content) {
        return None;
    }

    let bytes = content.as_bytes();
    for (i, &byte) in bytes.iter().enumerate() {
        if byte == b'#' && i > 0 && bytes[i - 1] == b' ' {
            return None;
        }
        if byte == b':' && (i + 1 == bytes.len() || bytes[i + 1] == b' ' || bytes[i + 1] == b'\t')
        {
            let key = content[..i].trim_end();
            if key.is_empty() {
                return None;
            }
            return Some((key.to_string(), content[i + 1..].trim()));
        }
    }
    None
}

/// Whether a quote character at byte `i` opens a quoted section.
fn opens_quote(bytes: &[u8], i: usize) -> bool {
    let before = bytes[..i]
        .iter()
        .rev()
        .find(|byte| !byte.is_ascii_whitespace())
        .copied();
    matches!(before, None | Some(b'[' | b'{' | b',' | b':'))
}

/// Remove a trailing `# comment`, ignoring `#` inside quoted sections.
pub(crate) fn strip_comment(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(b'"') => {
                if byte == b'\\' {
                    i += 1;
                } else if byte == b'"' {
                    quote = None;
                }
            }
            Some(_) => {
                if byte == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 1;
                    } else {
                        quote = None;
                    }
                }
            }
            None => {
                if (byte == b'"' || byte == b'\'') && opens_quote(bytes, i) {
                    quote = Some(byte);
                } else if byte == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
                    return &text[..i];
                }
            }
        }
        i += 1;
    }
    text
}

/// Parse a value written on the same line as its key or list marker.
pub(crate) fn parse_inline_value(text: &str, line: usize) -> Result<Value, HeaderError> {
    let text = strip_comment(text).trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }
    match text.as_bytes()[0] {
        b'"' | b'\'' => {
            let (value, rest) = parse_quoted(text, line)?;
            if !rest.trim().is_empty() {
                return Err(error(line, "unexpected text after a quoted value"));
            }
            Ok(Value::String(value))
        }
        b'[' => {
            let inner = text
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(|| error(line, "unterminated flow list"))?;
            let items = split_flow_items(inner, line)?;
            items
                .into_iter()
                .map(|item| parse_inline_value(item, line))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        b'{' => {
            let inner = text
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .ok_or_else(|| error(line, "unterminated flow mapping"))?;
            let mut map = Map::new();
            for item in split_flow_items(inner, line)? {
                let (key, rest) = split_key(item)
                    .ok_or_else(|| error(line, format!("expected `key: value` in '{item}'")))?;
                if map.contains_key(&key) {
                    return Err(error(line, format!("duplicate key '{key}'")));
                }
                map.insert(key, parse_inline_value(rest, line)?);
            }
            Ok(Value::Object(map))
        }
        _ => Ok(plain_scalar(text)),
    }
}

/// Split the inside of a flow collection on top-level commas.
fn split_flow_items(inner: &str, line: usize) -> Result<Vec<&str>, HeaderError> {
    let bytes = inner.as_bytes();
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(b'"') => {
                if byte == b'\\' {
                    i += 1;
                } else if byte == b'"' {
                    quote = None;
                }
            }
            Some(_) => {
                if byte == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 1;
                    } else {
                        quote = None;
                    }
                }
            }
            None => match byte {
                b'"' | b'\'' if opens_quote(bytes, i) => quote = Some(byte),
                b'[' | b'{' => depth += 1,
                b']' | b'}' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| error(line, "unbalanced brackets"))?;
                }
                b',' if depth == 0 => {
                    items.push(inner[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    if quote.is_some() {
        return Err(error(line, "unterminated quoted value"));
    }
    if depth != 0 {
        return Err(error(line, "unbalanced brackets"));
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    if items.iter().any(|item| item.is_empty()) {
        return Err(error(line, "empty item in flow collection"));
    }
    Ok(items)
}

/// Parse a quoted scalar at the start of `text`; returns the value and the rest.
fn parse_quoted(text: &str, line: usize) -> Result<(String, &str), HeaderError> {
    let mut chars = text.char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(error(line, "expected a quoted value"));
    };
    let mut value = String::new();

    if quote == '\'' {
        while let Some((i, ch)) = chars.next() {
            if ch == '\'' {
                if text[i + 1..].starts_with('\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    return Ok((value, &text[i + 1..]));
                }
            } else {
                value.push(ch);
            }
        }
        return Err(error(line, "unterminated single-quoted value"));
    }

    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' => return Ok((value, &text[i + 1..])),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    break;
                };
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '"' => value.push('"'),
                    '\\' => value.push('\\'),
                    '/' => value.push('/'),
                    'u' => {
                        let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| error(line, format!("invalid escape \\u{hex}")))?;
                        value.push(decoded);
                    }
                    other => {
                        return Err(error(line, format!("unknown escape sequence \\{other}")));
                    }
                }
            }
            other => value.push(other),
        }
    }
    Err(error(line, "unterminated double-quoted value"))
}

/// Interpret an unquoted scalar.
///
/// Integers with leading zeros (other than `0` itself) stay text so values like
/// `0042` survive a round trip unchanged.
pub(crate) fn plain_scalar(text: &str) -> Value {
    match text {
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        "null" | "Null" | "NULL" | "~" => return Value::Null,
        _ => {}
    }
    if is_integer(text) {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Ok(n) = text.parse::<u64>() {
            return Value::Number(n.into());
        }
    } else if is_float(text) {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

fn unsigned(text: &str) -> &str {
    text.strip_prefix(['+', '-']).unwrap_or(text)
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn is_integer(text: &str) -> bool {
    let digits = unsigned(text);
    is_digits(digits) && (digits == "0" || !digits.starts_with('0'))
}

fn is_float(text: &str) -> bool {
    let body = unsigned(text);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    if let Some(exponent) = exponent {
        if !is_digits(unsigned(exponent)) {
            return false;
        }
    }
    let (whole, fraction) = match mantissa.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (mantissa, None),
    };
    let whole_ok = whole.is_empty() || (is_digits(whole) && (whole == "0" || !whole.starts_with('0')));
    match fraction {
        Some(fraction) => {
            whole_ok
                && (fraction.is_empty() || is_digits(fraction))
                && !(whole.is_empty() && fraction.is_empty())
        }
        None => exponent.is_some() && !whole.is_empty() && whole_ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Value {
        parse_header(text).unwrap()
    }

    #[test]
    fn test_flat_mapping() {
        let value = parse("id: npc_ember_fl4m3\ntype: npc\nname: Ember Thorn\nlevel: 7\nalive: true");
        assert_eq!(
            value,
            json!({
                "id": "npc_ember_fl4m3",
                "type": "npc",
                "name": "Ember Thorn",
                "level": 7,
                "alive": true
            })
        );
    }

    #[test]
    fn test_empty_block_is_empty_mapping() {
        assert_eq!(parse(""), json!({}));
        assert_eq!(parse("\n# only a comment\n"), json!({}));
    }

    #[test]
    fn test_nested_mapping() {
        let value = parse("stats:\n  hp: 12\n  armor:\n    base: 14\nname: Sable");
        assert_eq!(
            value,
            json!({"stats": {"hp": 12, "armor": {"base": 14}}, "name": "Sable"})
        );
    }

    #[test]
    fn test_block_lists() {
        let indented = parse("aliases:\n  - Flame\n  - The Smith\nname: Ember");
        assert_eq!(
            indented,
            json!({"aliases": ["Flame", "The Smith"], "name": "Ember"})
        );

        let flush = parse("aliases:\n- Flame\n- The Smith\nname: Ember");
        assert_eq!(flush, indented);
    }

    #[test]
    fn test_list_of_mappings() {
        let value = parse(
            "alliances:\n  - faction: faction_ash_ab12\n    standing: sworn\n  - faction: faction_iron_cd34\nname: Ember",
        );
        assert_eq!(
            value,
            json!({
                "alliances": [
                    {"faction": "faction_ash_ab12", "standing": "sworn"},
                    {"faction": "faction_iron_cd34"}
                ],
                "name": "Ember"
            })
        );
    }

    #[test]
    fn test_nested_list_in_list_item_mapping() {
        let value = parse("knowledge:\n  - scope: secret\n    facts:\n      - The vault code\n      - The traitor's name\n");
        assert_eq!(
            value,
            json!({"knowledge": [{"scope": "secret", "facts": ["The vault code", "The traitor's name"]}]})
        );
    }

    #[test]
    fn test_dash_dash_and_bare_dash_items() {
        let value = parse("grid:\n  - - a\n    - b\n  -\n    x: 1\n  -\n");
        assert_eq!(value, json!({"grid": [["a", "b"], {"x": 1}, null]}));
    }

    #[test]
    fn test_flow_collections() {
        let value = parse("aliases: [Flame, \"Ember, the Smith\", 'It''s her']\nempty: []\nnone: {}\npos: {x: 1, y: -2}");
        assert_eq!(
            value,
            json!({
                "aliases": ["Flame", "Ember, the Smith", "It's her"],
                "empty": [],
                "none": {},
                "pos": {"x": 1, "y": -2}
            })
        );
    }

    #[test]
    fn test_scalars() {
        let value = parse(
            "a: 0042\nb: 3.5\nc: ~\nd:\ne: yes\nf: \"true\"\ng: -7\nh: 1e3\ni: v1.2\nj: \"tab\\tnew\\nline \\u00e9\"",
        );
        assert_eq!(value["a"], json!("0042"));
        assert_eq!(value["b"], json!(3.5));
        assert_eq!(value["c"], Value::Null);
        assert_eq!(value["d"], Value::Null);
        assert_eq!(value["e"], json!("yes"));
        assert_eq!(value["f"], json!("true"));
        assert_eq!(value["g"], json!(-7));
        assert_eq!(value["h"], json!(1000.0));
        assert_eq!(value["i"], json!("v1.2"));
        assert_eq!(value["j"], json!("tab\tnew\nline é"));
    }

    #[test]
    fn test_comments() {
        let value = parse("# heading comment\nname: Ember # the smith\nhex: C#\nquote: \"a # b\"\nlist:\n  # note\n  - x # first\n");
        assert_eq!(
            value,
            json!({"name": "Ember", "hex": "C#", "quote": "a # b", "list": ["x"]})
        );
    }

    #[test]
    fn test_apostrophes_are_not_quotes() {
        let value = parse("motto: Ember's forge # comment\nrole: smith");
        assert_eq!(value, json!({"motto": "Ember's forge", "role": "smith"}));
    }

    #[test]
    fn test_literal_block_scalars() {
        let value = parse("summary: |\n  First line\n\n  Third line\nkeep: |+\n  a\n\nstrip: |-\n  b\nname: Ember");
        assert_eq!(value["summary"], json!("First line\n\nThird line\n"));
        assert_eq!(value["keep"], json!("a\n\n"));
        assert_eq!(value["strip"], json!("b"));
        assert_eq!(value["name"], json!("Ember"));
    }

    #[test]
    fn test_folded_block_scalar() {
        let value = parse("summary: >\n  one\n  two\n\n  three\n");
        assert_eq!(value["summary"], json!("one two\nthree\n"));
    }

    #[test]
    fn test_block_scalar_in_list() {
        let value = parse("notes:\n  - |-\n    line one\n    line two\n  - short\n");
        assert_eq!(value["notes"], json!(["line one\nline two", "short"]));
    }

    #[test]
    fn test_quoted_keys() {
        let value = parse("\"odd: key\": 1\n'x': 2");
        assert_eq!(value, json!({"odd: key": 1, "x": 2}));
    }

    #[test]
    fn test_root_list_and_scalar() {
        assert_eq!(parse("- a\n- b"), json!(["a", "b"]));
        assert_eq!(parse("just text"), json!("just text"));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_header("name: Ember\n    role: smith").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse_header("name: Ember\nname: Sable").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("duplicate"));

        let err = parse_header("a: [1, 2").unwrap_err();
        assert!(err.message.contains("unterminated"));

        let err = parse_header("a: \"open").unwrap_err();
        assert_eq!(err.line, 1);

        let err = parse_header("list:\n  - a\n  b: c").unwrap_err();
        assert_eq!(err.line, 3);

        let err = parse_header("a:\n\tb: 1").unwrap_err();
        assert!(err.message.contains("tabs"));
    }

    #[test]
    fn test_crlf_lines() {
        let value = parse("name: Ember\r\naliases:\r\n  - Flame\r\n");
        assert_eq!(value, json!({"name": "Ember", "aliases": ["Flame"]}));
    }

    #[test]
    fn test_plain_scalar_numbers() {
        assert_eq!(plain_scalar("0"), json!(0));
        assert_eq!(plain_scalar("-0.5"), json!(-0.5));
        assert_eq!(plain_scalar(".5"), json!(0.5));
        assert_eq!(plain_scalar("1."), json!(1.0));
        assert_eq!(plain_scalar("1/4"), json!("1/4"));
        assert_eq!(plain_scalar("."), json!("."));
        assert_eq!(plain_scalar("e5"), json!("e5"));
        assert_eq!(plain_scalar("2024-03-01"), json!("2024-03-01"));
        assert_eq!(plain_scalar("99999999999999999999"), json!("99999999999999999999"));
    }
}
