//! Entity document codec.
//!
//! Two on-disk formats are supported:
//!
//! - **Header+body** (`.md`, `.markdown`): a `---` delimited header block holding
//!   the entity fields, followed by a body that is carried byte for byte.
//! - **Structured** (`.json`): the whole file is the entity. On save, keys are
//!   sorted at every level so equal content always produces equal bytes.
//!
//! The codec performs no I/O. Callers read and write through a
//! [`FileSystemPort`](crate::ports::FileSystemPort).

mod emit;
mod header;
mod structured;

pub use emit::{emit_header, emit_scalar};
pub use header::{parse_header, HeaderError};
pub use structured::to_canonical_json;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use vault_model::{field_order, validate_fields, Entity, EntityKind, ValidationIssue};

use crate::error::{CodecError, EntityValidationError};

/// Line that opens and closes the header block.
pub const HEADER_DELIMITER: &str = "---";

/// On-disk layout of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    HeaderBody,
    Structured,
}

impl DocumentFormat {
    /// Select the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "md" | "markdown" => Some(DocumentFormat::HeaderBody),
            "json" => Some(DocumentFormat::Structured),
            _ => None,
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::HeaderBody => "md",
            DocumentFormat::Structured => "json",
        }
    }
}

/// A decoded document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub entity: Entity,
    /// Verbatim body text. For structured documents this is the source text.
    pub body: String,
}

impl Document {
    pub fn new(
        path: impl Into<PathBuf>,
        format: DocumentFormat,
        entity: Entity,
        body: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            entity,
            body: body.into(),
        }
    }
}

/// A soft problem found while splitting a header+body document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderWarning {
    /// An opening delimiter with no closing delimiter.
    Unterminated,
    /// The header parsed, but not to a mapping.
    NotAMapping,
    Syntax(HeaderError),
}

impl fmt::Display for HeaderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderWarning::Unterminated => write!(f, "header block has no closing delimiter"),
            HeaderWarning::NotAMapping => write!(f, "header block is not a mapping"),
            HeaderWarning::Syntax(err) => write!(f, "header block {err}"),
        }
    }
}

/// The lenient result of splitting a header+body document.
///
/// A malformed header never fails: fields come back empty, the whole text
/// becomes the body, and the problem is reported in `warnings`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDocument {
    pub fields: Map<String, Value>,
    pub body: String,
    pub warnings: Vec<HeaderWarning>,
}

impl RawDocument {
    fn fallback(text: &str, warning: HeaderWarning) -> Self {
        Self {
            fields: Map::new(),
            body: text.to_string(),
            warnings: vec![warning],
        }
    }
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == HEADER_DELIMITER
}

/// Split a header+body document into its header fields and verbatim body.
pub fn split_document(text: &str) -> RawDocument {
    let (first, after_first) = match text.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (text, ""),
    };
    if !is_delimiter(first.trim_start_matches('\u{feff}')) {
        return RawDocument {
            fields: Map::new(),
            body: text.to_string(),
            warnings: Vec::new(),
        };
    }

    let mut offset = 0;
    let mut closing = None;
    for line in after_first.split_inclusive('\n') {
        if is_delimiter(line.trim_end_matches(['\n', '\r'])) {
            closing = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let Some((header_end, body_start)) = closing else {
        warn!("header block has no closing delimiter");
        return RawDocument::fallback(text, HeaderWarning::Unterminated);
    };

    let header = &after_first[..header_end];
    match parse_header(header) {
        Ok(Value::Object(fields)) => RawDocument {
            fields,
            body: after_first[body_start..].to_string(),
            warnings: Vec::new(),
        },
        Ok(_) => {
            warn!("header block is not a mapping");
            RawDocument::fallback(text, HeaderWarning::NotAMapping)
        }
        Err(mut err) => {
            // Report the line number within the whole document.
            err.line += 1;
            warn!(line = err.line, error = %err.message, "malformed header block");
            RawDocument::fallback(text, HeaderWarning::Syntax(err))
        }
    }
}

/// Produces schema issues for a decoded field map.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, fields: &Map<String, Value>) -> Vec<ValidationIssue>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&Map<String, Value>) -> Vec<ValidationIssue> + Send + Sync,
{
    fn validate(&self, fields: &Map<String, Value>) -> Vec<ValidationIssue> {
        self(fields)
    }
}

/// The built-in per-kind schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct KindSchema;

impl SchemaValidator for KindSchema {
    fn validate(&self, fields: &Map<String, Value>) -> Vec<ValidationIssue> {
        validate_fields(fields)
    }
}

/// Decodes and encodes entity documents.
#[derive(Clone)]
pub struct EntityCodec {
    validator: Arc<dyn SchemaValidator>,
}

impl Default for EntityCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCodec").finish_non_exhaustive()
    }
}

impl EntityCodec {
    /// A codec validating with the built-in per-kind schema.
    pub fn new() -> Self {
        Self::with_validator(KindSchema)
    }

    pub fn with_validator(validator: impl SchemaValidator + 'static) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }

    /// Decode raw document bytes read from `path`.
    pub fn decode(&self, path: &Path, raw: &[u8]) -> Result<Document, CodecError> {
        let format = DocumentFormat::from_path(path)
            .ok_or_else(|| CodecError::UnsupportedFormat(path.to_path_buf()))?;
        let text =
            std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8(path.to_path_buf()))?;

        let (fields, body, mut issues) = match format {
            DocumentFormat::HeaderBody => {
                let raw_document = split_document(text);
                let issues = raw_document
                    .warnings
                    .iter()
                    .map(|warning| ValidationIssue::new("header", warning.to_string()))
                    .collect();
                (raw_document.fields, raw_document.body, issues)
            }
            DocumentFormat::Structured => match serde_json::from_str::<Value>(text)? {
                Value::Object(fields) => (fields, text.to_string(), Vec::new()),
                _ => (
                    Map::new(),
                    text.to_string(),
                    vec![ValidationIssue::new("document", "expected a mapping")],
                ),
            },
        };

        let entity = self.build_entity(path, fields, &mut issues)?;
        Ok(Document {
            path: path.to_path_buf(),
            format,
            entity,
            body,
        })
    }

    /// Encode an entity and body in `format`.
    ///
    /// The entity is validated first; nothing is produced for an invalid entity.
    pub fn encode(
        &self,
        entity: &Entity,
        body: &str,
        format: DocumentFormat,
    ) -> Result<Vec<u8>, CodecError> {
        self.encode_at(Path::new(""), entity, body, format)
    }

    /// Encode a document in its own format.
    pub fn encode_document(&self, document: &Document) -> Result<Vec<u8>, CodecError> {
        self.encode_at(
            &document.path,
            &document.entity,
            &document.body,
            document.format,
        )
    }

    fn encode_at(
        &self,
        path: &Path,
        entity: &Entity,
        body: &str,
        format: DocumentFormat,
    ) -> Result<Vec<u8>, CodecError> {
        let fields = entity.to_fields();
        let issues = self.validator.validate(&fields);
        if !issues.is_empty() {
            return Err(EntityValidationError::new(entity.kind().as_str(), path, issues).into());
        }

        let text = match format {
            DocumentFormat::HeaderBody => {
                let order = field_order(Some(entity.kind()));
                let mut text = String::with_capacity(body.len() + 256);
                text.push_str(HEADER_DELIMITER);
                text.push('\n');
                text.push_str(&emit_header(&fields, &order));
                text.push_str(HEADER_DELIMITER);
                text.push('\n');
                text.push_str(body);
                text
            }
            DocumentFormat::Structured => to_canonical_json(&fields)?,
        };
        Ok(text.into_bytes())
    }

    fn build_entity(
        &self,
        path: &Path,
        fields: Map<String, Value>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Result<Entity, EntityValidationError> {
        let entity_type = entity_type_of(&fields);
        issues.extend(self.validator.validate(&fields));
        if !issues.is_empty() {
            return Err(EntityValidationError::new(
                entity_type,
                path,
                std::mem::take(issues),
            ));
        }
        Entity::from_fields(fields)
            .map_err(|issues| EntityValidationError::new(entity_type, path, issues))
    }
}

fn entity_type_of(fields: &Map<String, Value>) -> String {
    fields
        .get("type")
        .and_then(Value::as_str)
        .map(|name| match EntityKind::from_type_name(name) {
            Some(kind) => kind.as_str().to_string(),
            None => name.to_string(),
        })
        .unwrap_or_else(|| "unknown".to_string())
}
