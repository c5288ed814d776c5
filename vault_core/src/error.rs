//! Error types. Every failure is scoped to one document or one reference.

use std::path::PathBuf;
use thiserror::Error;
use vault_model::ValidationIssue;

/// A document failed its schema; carries every violated rule at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity_type} document {}: {}", .path.display(), summarize(.issues))]
pub struct EntityValidationError {
    /// The document's `type`, or `unknown` when it has none.
    pub entity_type: String,
    pub path: PathBuf,
    pub issues: Vec<ValidationIssue>,
}

impl EntityValidationError {
    pub fn new(
        entity_type: impl Into<String>,
        path: impl Into<PathBuf>,
        issues: Vec<ValidationIssue>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            path: path.into(),
            issues,
        }
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    let parts: Vec<String> = issues.iter().map(ToString::to_string).collect();
    parts.join("; ")
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no document format for {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error(transparent)]
    Validation(#[from] EntityValidationError),
    #[error("structured document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{} is not valid UTF-8", .0.display())]
    InvalidUtf8(PathBuf),
}

/// Failure reported by a collaborator port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),
    #[error("i/o error on {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("backend error: {0}")]
    Backend(String),
}

impl PortError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound(_))
    }
}

/// The single attachment failure. Caches are left untouched when it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("unresolvable attachment '{reference}'")]
    Unresolvable { reference: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors from context-level load/save operations.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Validation(#[from] EntityValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = EntityValidationError::new(
            "npc",
            "npcs/ember.md",
            vec![
                ValidationIssue::new("name", "required field is missing"),
                ValidationIssue::new("aliases", "expected a list, found text"),
            ],
        );
        let text = err.to_string();
        assert!(text.starts_with("invalid npc document npcs/ember.md"));
        assert!(text.contains("name: required field is missing"));
        assert!(text.contains("aliases: expected a list"));
    }

    #[test]
    fn test_port_error_not_found() {
        assert!(PortError::NotFound(PathBuf::from("a.md")).is_not_found());
        assert!(!PortError::Backend("offline".into()).is_not_found());
    }
}
