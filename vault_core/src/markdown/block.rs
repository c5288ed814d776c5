//! Block phase: classify lines into raw blocks.
//!
//! Each line is tried against the block kinds in priority order: fence,
//! heading, list item, table start, blank, paragraph text.

use serde::{Deserialize, Serialize};

/// Column alignment taken from a table's separator row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

/// A block whose text has not been through the inline phase yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawBlock {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph(String),
    List {
        ordered: bool,
        start: Option<u64>,
        items: Vec<String>,
    },
    Table {
        alignments: Vec<Alignment>,
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Code {
        language: Option<String>,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ListMarker {
    Bullet,
    Ordered(u64),
}

/// Split `text` into raw blocks, top to bottom.
pub(crate) fn split_blocks(text: &str) -> Vec<RawBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some((fence, language)) = fence_open(line) {
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && !fence_closes(lines[i], fence) {
                body.push(lines[i]);
                i += 1;
            }
            // Skip the closing fence; an unclosed fence runs to the end.
            i += 1;
            blocks.push(RawBlock::Code {
                language,
                text: body.join("\n"),
            });
            continue;
        }

        if let Some((level, text)) = heading(line) {
            blocks.push(RawBlock::Heading {
                level,
                text: text.to_string(),
            });
            i += 1;
            continue;
        }

        if let Some((marker, _)) = list_item(line) {
            let ordered = matches!(marker, ListMarker::Ordered(_));
            let start = match marker {
                ListMarker::Ordered(n) => Some(n),
                ListMarker::Bullet => None,
            };
            let mut items = Vec::new();
            while let Some((next, item)) = lines.get(i).and_then(|line| list_item(line)) {
                if matches!(next, ListMarker::Ordered(_)) != ordered {
                    break;
                }
                items.push(item.to_string());
                i += 1;
            }
            blocks.push(RawBlock::List {
                ordered,
                start,
                items,
            });
            continue;
        }

        if let Some(alignments) = table_start(line, lines.get(i + 1).copied()) {
            let header = split_row(line);
            let width = header.len();
            i += 2;
            let mut rows = Vec::new();
            while i < lines.len() && is_table_row(lines[i]) {
                let mut row = split_row(lines[i]);
                row.resize(width, String::new());
                rows.push(row);
                i += 1;
            }
            blocks.push(RawBlock::Table {
                alignments,
                header,
                rows,
            });
            continue;
        }

        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        let mut parts = Vec::new();
        while i < lines.len() && continues_paragraph(&lines, i) {
            parts.push(lines[i].trim());
            i += 1;
        }
        blocks.push(RawBlock::Paragraph(parts.join(" ")));
    }

    blocks
}

fn continues_paragraph(lines: &[&str], i: usize) -> bool {
    let line = lines[i];
    !line.trim().is_empty()
        && fence_open(line).is_none()
        && heading(line).is_none()
        && list_item(line).is_none()
        && table_start(line, lines.get(i + 1).copied()).is_none()
}

fn fence_open(line: &str) -> Option<(Fence, Option<String>)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    let language = info
        .split_whitespace()
        .next()
        .map(str::to_string);
    Some((Fence { marker, len }, language))
}

fn fence_closes(line: &str, fence: Fence) -> bool {
    let trimmed = line.trim();
    let len = trimmed.chars().take_while(|c| *c == fence.marker).count();
    len >= fence.len && trimmed.chars().all(|c| c == fence.marker)
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level as u8, rest.trim()))
}

fn list_item(line: &str) -> Option<(ListMarker, &str)> {
    let trimmed = line.trim_start();
    for bullet in ["- ", "* ", "+ "] {
        if let Some(item) = trimmed.strip_prefix(bullet) {
            return Some((ListMarker::Bullet, item.trim()));
        }
    }

    let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let rest = &trimmed[digits..];
    let item = rest
        .strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))?;
    let number = trimmed[..digits].parse().ok()?;
    Some((ListMarker::Ordered(number), item.trim()))
}

fn table_start(line: &str, next: Option<&str>) -> Option<Vec<Alignment>> {
    if !line.contains('|') {
        return None;
    }
    separator_row(next?)
}

/// Alignments for a `| --- | :-: |` separator row.
fn separator_row(line: &str) -> Option<Vec<Alignment>> {
    if !line.contains('|') || !line.contains('-') {
        return None;
    }
    split_row(line)
        .iter()
        .map(|cell| {
            let left = cell.starts_with(':');
            let right = cell.ends_with(':');
            let dashes = cell.trim_start_matches(':').trim_end_matches(':');
            if dashes.is_empty() || !dashes.chars().all(|c| c == '-') {
                return None;
            }
            Some(match (left, right) {
                (true, true) => Alignment::Center,
                (true, false) => Alignment::Left,
                (false, true) => Alignment::Right,
                (false, false) => Alignment::None,
            })
        })
        .collect()
}

fn is_table_row(line: &str) -> bool {
    line.contains('|') && !line.trim().is_empty() && fence_open(line).is_none()
}

/// Split a table row into trimmed cells, honouring `\|` escapes.
fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = if trimmed.ends_with('|') && !trimmed.ends_with("\\|") {
        &trimmed[..trimmed.len() - 1]
    } else {
        trimmed
    };

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                cell.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
            c => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings() {
        let blocks = split_blocks("# Title\n###### Deep\n####### Seven\n#NoSpace");
        assert_eq!(
            blocks,
            vec![
                RawBlock::Heading {
                    level: 1,
                    text: "Title".into()
                },
                RawBlock::Heading {
                    level: 6,
                    text: "Deep".into()
                },
                RawBlock::Paragraph("####### Seven #NoSpace".into()),
            ]
        );
    }

    #[test]
    fn test_paragraphs_join_lines() {
        let blocks = split_blocks("First line\n  second line\n\nNext para\n");
        assert_eq!(
            blocks,
            vec![
                RawBlock::Paragraph("First line second line".into()),
                RawBlock::Paragraph("Next para".into()),
            ]
        );
    }

    #[test]
    fn test_fenced_code_is_verbatim() {
        let blocks = split_blocks("```rust\n# not a heading\n- not a list\n\n| a | b |\n```\nafter");
        assert_eq!(
            blocks,
            vec![
                RawBlock::Code {
                    language: Some("rust".into()),
                    text: "# not a heading\n- not a list\n\n| a | b |".into()
                },
                RawBlock::Paragraph("after".into()),
            ]
        );
    }

    #[test]
    fn test_tilde_and_unclosed_fences() {
        let blocks = split_blocks("~~~~\n```\ninner\n~~~~\n```\nrest\nof file");
        assert_eq!(
            blocks,
            vec![
                RawBlock::Code {
                    language: None,
                    text: "```\ninner".into()
                },
                RawBlock::Code {
                    language: None,
                    text: "rest\nof file".into()
                },
            ]
        );
    }

    #[test]
    fn test_lists() {
        let blocks = split_blocks("- one\n* two\n+ three\n1. first\n2) second\ntext");
        assert_eq!(
            blocks,
            vec![
                RawBlock::List {
                    ordered: false,
                    start: None,
                    items: vec!["one".into(), "two".into(), "three".into()]
                },
                RawBlock::List {
                    ordered: true,
                    start: Some(1),
                    items: vec!["first".into(), "second".into()]
                },
                RawBlock::Paragraph("text".into()),
            ]
        );
    }

    #[test]
    fn test_list_interrupts_paragraph() {
        let blocks = split_blocks("Intro\n- item\n*emphasis* is not a bullet");
        assert_eq!(
            blocks,
            vec![
                RawBlock::Paragraph("Intro".into()),
                RawBlock::List {
                    ordered: false,
                    start: None,
                    items: vec!["item".into()]
                },
                RawBlock::Paragraph("*emphasis* is not a bullet".into()),
            ]
        );
    }

    #[test]
    fn test_table() {
        let text = "| Name | HP | Notes |\n|:-----|---:|:-:|\n| Ember | 12 | a \\| b |\n| Sable | 9\n\nafter";
        let blocks = split_blocks(text);
        assert_eq!(
            blocks,
            vec![
                RawBlock::Table {
                    alignments: vec![Alignment::Left, Alignment::Right, Alignment::Center],
                    header: vec!["Name".into(), "HP".into(), "Notes".into()],
                    rows: vec![
                        vec!["Ember".into(), "12".into(), "a | b".into()],
                        vec!["Sable".into(), "9".into(), "".into()],
                    ],
                },
                RawBlock::Paragraph("after".into()),
            ]
        );
    }

    #[test]
    fn test_table_ends_at_non_pipe_line() {
        let blocks = split_blocks("a | b\n--|--\n1 | 2\nplain\n");
        assert!(matches!(&blocks[0], RawBlock::Table { rows, .. } if rows.len() == 1));
        assert_eq!(blocks[1], RawBlock::Paragraph("plain".into()));
    }

    #[test]
    fn test_pipe_without_separator_is_paragraph() {
        let blocks = split_blocks("a | b\nc | d");
        assert_eq!(blocks, vec![RawBlock::Paragraph("a | b c | d".into())]);
    }
}
