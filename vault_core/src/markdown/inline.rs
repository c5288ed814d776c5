//! Inline phase.
//!
//! The text is scanned once per rule, in fixed precedence: code spans, attachment
//! embeds, images, links, bold, italic. A rule may only match characters no
//! earlier rule has claimed, and a match must lie entirely inside one unclaimed
//! run. A final forward walk emits the claimed nodes and the text between them.
//!
//! Emphasis does not nest: once `**bold**` is claimed, an italic delimiter that
//! would need to span it stays literal text.

use super::{AttachmentEmbed, Inline};

/// Parse one block's raw text into inline nodes.
pub(crate) fn parse_inlines(text: &str) -> Vec<Inline> {
    let mut table = ClaimTable::new(text);
    for rule in RULES {
        table.apply(*rule);
    }
    table.into_inlines()
}

type Rule = fn(&ClaimTable, usize) -> Option<(usize, Inline)>;

/// Rules in precedence order. Each returns the end of its match and the node.
const RULES: &[Rule] = &[code_span, embed, image, link, bold, italic];

struct ClaimTable {
    chars: Vec<char>,
    /// For each position, the index into `spans` of the node claiming it.
    claims: Vec<Option<usize>>,
    spans: Vec<(usize, usize, Inline)>,
}

impl ClaimTable {
    fn new(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        Self {
            claims: vec![None; chars.len()],
            chars,
            spans: Vec::new(),
        }
    }

    fn is_free(&self, at: usize) -> bool {
        self.claims.get(at).is_some_and(Option::is_none)
    }

    fn starts_with(&self, at: usize, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(offset, c)| self.is_free(at + offset) && self.chars[at + offset] == c)
    }

    /// First position at or after `from` where `pattern` starts, staying inside
    /// the unclaimed run that contains `from`.
    fn find(&self, from: usize, pattern: &str) -> Option<usize> {
        let mut at = from;
        while self.is_free(at) {
            if self.starts_with(at, pattern) {
                return Some(at);
            }
            at += 1;
        }
        None
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn apply(&mut self, rule: Rule) {
        let mut at = 0;
        while at < self.chars.len() {
            if !self.is_free(at) {
                at += 1;
                continue;
            }
            match rule(self, at) {
                Some((end, node)) => {
                    let id = self.spans.len();
                    self.spans.push((at, end, node));
                    for claim in &mut self.claims[at..end] {
                        *claim = Some(id);
                    }
                    at = end;
                }
                None => at += 1,
            }
        }
    }

    fn into_inlines(self) -> Vec<Inline> {
        let mut nodes: Vec<Option<Inline>> = Vec::with_capacity(self.spans.len());
        let mut bounds = Vec::with_capacity(self.spans.len());
        for (start, end, node) in self.spans {
            bounds.push((start, end));
            nodes.push(Some(node));
        }

        let mut inlines = Vec::new();
        let mut text = String::new();
        let mut at = 0;
        while at < self.chars.len() {
            match self.claims[at] {
                None => {
                    text.push(self.chars[at]);
                    at += 1;
                }
                Some(id) => {
                    if !text.is_empty() {
                        inlines.push(Inline::Text(std::mem::take(&mut text)));
                    }
                    if let Some(node) = nodes[id].take() {
                        inlines.push(node);
                    }
                    at = bounds[id].1;
                }
            }
        }
        if !text.is_empty() {
            inlines.push(Inline::Text(text));
        }
        inlines
    }
}

fn code_span(table: &ClaimTable, at: usize) -> Option<(usize, Inline)> {
    if !table.starts_with(at, "`") {
        return None;
    }
    let close = table.find(at + 1, "`")?;
    if close == at + 1 {
        return None;
    }
    Some((close + 1, Inline::Code(table.slice(at + 1, close))))
}

fn embed(table: &ClaimTable, at: usize) -> Option<(usize, Inline)> {
    if !table.starts_with(at, "![[") {
        return None;
    }
    let close = table.find(at + 3, "]]")?;
    let inner = table.slice(at + 3, close);
    let (target, alias) = match inner.split_once('|') {
        Some((target, alias)) => (target.trim(), Some(alias.trim())),
        None => (inner.trim(), None),
    };
    if target.is_empty() || target.contains(['[', ']']) {
        return None;
    }
    Some((
        close + 2,
        Inline::Embed(AttachmentEmbed {
            target: target.to_string(),
            alias: alias.filter(|alias| !alias.is_empty()).map(str::to_string),
            resolved_url: None,
        }),
    ))
}

/// Match `[label](destination)` starting at `at`; returns the end and both parts.
fn bracketed(table: &ClaimTable, at: usize) -> Option<(usize, String, String)> {
    if !table.starts_with(at, "[") {
        return None;
    }
    let label_end = table.find(at + 1, "]")?;
    if !table.starts_with(label_end + 1, "(") {
        return None;
    }
    let close = table.find(label_end + 2, ")")?;
    let label = table.slice(at + 1, label_end);
    let destination = table.slice(label_end + 2, close).trim().to_string();
    if destination.is_empty() || destination.contains(char::is_whitespace) {
        return None;
    }
    Some((close + 1, label, destination))
}

fn image(table: &ClaimTable, at: usize) -> Option<(usize, Inline)> {
    if !table.starts_with(at, "!") {
        return None;
    }
    let (end, alt, src) = bracketed(table, at + 1)?;
    Some((end, Inline::Image { alt, src }))
}

fn link(table: &ClaimTable, at: usize) -> Option<(usize, Inline)> {
    let (end, text, url) = bracketed(table, at)?;
    if text.trim().is_empty() {
        return None;
    }
    Some((end, Inline::Link { text, url }))
}

/// Match `delimiter content delimiter` with content that neither starts nor
/// ends with whitespace.
fn emphasis(table: &ClaimTable, at: usize, delimiter: &str) -> Option<(usize, String)> {
    if !table.starts_with(at, delimiter) {
        return None;
    }
    let width = delimiter.chars().count();
    let open_end = at + width;
    let close = table.find(open_end, delimiter)?;
    if close == open_end {
        return None;
    }
    let content = table.slice(open_end, close);
    if content.starts_with(char::is_whitespace) || content.ends_with(char::is_whitespace) {
        return None;
    }
    Some((close + width, content))
}

fn bold(table: &ClaimTable, at: usize) -> Option<(usize, Inline)> {
    let (end, content) = emphasis(table, at, "**")?;
    Some((end, Inline::Bold(content)))
}

fn italic(table: &ClaimTable, at: usize) -> Option<(usize, Inline)> {
    let (end, content) = emphasis(table, at, "*")?;
    Some((end, Inline::Italic(content)))
}
