//! Markdown Rendering Pipeline.
//!
//! Rendering runs in two phases. The block phase walks the lines once and
//! classifies them into headings, paragraphs, lists, tables and fenced code.
//! The inline phase then turns each non-code block's text into inline nodes.
//! The result is an abstract tree; presentation is up to the caller.
//!
//! Attachment embeds (`![[name|alias]]`) never block rendering. Use
//! [`render_with_cache`] to fill in URLs that are already cached, or
//! [`MarkdownDocument::resolve_embeds`] to resolve the rest.

mod block;
mod inline;

pub use block::Alignment;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attachments::{AttachmentResolver, CacheSnapshot};
use crate::error::AttachmentError;
use block::{split_blocks, RawBlock};
use inline::parse_inlines;

/// A rendered document: blocks in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkdownDocument {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Heading {
        level: u8,
        inlines: Vec<Inline>,
    },
    Paragraph {
        inlines: Vec<Inline>,
    },
    List {
        ordered: bool,
        /// First number of an ordered list.
        start: Option<u64>,
        items: Vec<Vec<Inline>>,
    },
    Table {
        alignments: Vec<Alignment>,
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Code {
        language: Option<String>,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Code(String),
    Image { alt: String, src: String },
    Link { text: String, url: String },
    Bold(String),
    Italic(String),
    Embed(AttachmentEmbed),
}

/// A reference to media by name, resolved separately from parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentEmbed {
    pub target: String,
    pub alias: Option<String>,
    /// Filled in once the attachment has been resolved.
    pub resolved_url: Option<String>,
}

/// Render `text` into a block/inline tree.
pub fn render(text: &str) -> MarkdownDocument {
    let blocks = split_blocks(text)
        .into_iter()
        .map(|raw| match raw {
            RawBlock::Heading { level, text } => Block::Heading {
                level,
                inlines: parse_inlines(&text),
            },
            RawBlock::Paragraph(text) => Block::Paragraph {
                inlines: parse_inlines(&text),
            },
            RawBlock::List {
                ordered,
                start,
                items,
            } => Block::List {
                ordered,
                start,
                items: items.iter().map(|item| parse_inlines(item)).collect(),
            },
            RawBlock::Table {
                alignments,
                header,
                rows,
            } => Block::Table {
                alignments,
                header: header.iter().map(|cell| parse_inlines(cell)).collect(),
                rows: rows
                    .iter()
                    .map(|row| row.iter().map(|cell| parse_inlines(cell)).collect())
                    .collect(),
            },
            RawBlock::Code { language, text } => Block::Code { language, text },
        })
        .collect();
    MarkdownDocument { blocks }
}

/// Render `text`, filling embed URLs present in `cache`.
///
/// The output depends only on `text` and `cache`.
pub fn render_with_cache(text: &str, cache: &CacheSnapshot) -> MarkdownDocument {
    let mut document = render(text);
    document.for_each_embed(|embed| {
        embed.resolved_url = cache.get(&embed.target).map(str::to_string);
    });
    document
}

impl MarkdownDocument {
    /// Distinct embed targets, in order of first appearance.
    pub fn attachment_references(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for inlines in self.inline_runs() {
            for inline in inlines {
                if let Inline::Embed(embed) = inline {
                    if !targets.contains(&embed.target) {
                        targets.push(embed.target.clone());
                    }
                }
            }
        }
        targets
    }

    /// Resolve every embed concurrently and fill in its URL.
    ///
    /// Embeds that cannot be resolved keep `resolved_url: None`; their errors
    /// are returned.
    pub async fn resolve_embeds(&mut self, resolver: &AttachmentResolver) -> Vec<AttachmentError> {
        let targets = self.attachment_references();
        if targets.is_empty() {
            return Vec::new();
        }
        debug!(count = targets.len(), "resolving attachment embeds");

        let results = join_all(targets.iter().map(|target| resolver.resolve(target))).await;
        let mut urls = Vec::with_capacity(targets.len());
        let mut errors = Vec::new();
        for (target, result) in targets.into_iter().zip(results) {
            match result {
                Ok(url) => urls.push((target, url)),
                Err(err) => errors.push(err),
            }
        }

        self.for_each_embed(|embed| {
            if let Some((_, url)) = urls.iter().find(|(target, _)| *target == embed.target) {
                embed.resolved_url = Some(url.clone());
            }
        });
        errors
    }

    fn inline_runs(&self) -> Vec<&Vec<Inline>> {
        let mut runs = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Heading { inlines, .. } | Block::Paragraph { inlines } => runs.push(inlines),
                Block::List { items, .. } => runs.extend(items),
                Block::Table { header, rows, .. } => {
                    runs.extend(header);
                    runs.extend(rows.iter().flatten());
                }
                Block::Code { .. } => {}
            }
        }
        runs
    }

    fn for_each_embed(&mut self, mut apply: impl FnMut(&mut AttachmentEmbed)) {
        let mut visit = |inlines: &mut Vec<Inline>| {
            for inline in inlines {
                if let Inline::Embed(embed) = inline {
                    apply(embed);
                }
            }
        };
        for block in &mut self.blocks {
            match block {
                Block::Heading { inlines, .. } | Block::Paragraph { inlines } => visit(inlines),
                Block::List { items, .. } => items.iter_mut().for_each(&mut visit),
                Block::Table { header, rows, .. } => {
                    header.iter_mut().for_each(&mut visit);
                    rows.iter_mut().flatten().for_each(&mut visit);
                }
                Block::Code { .. } => {}
            }
        }
    }
}
