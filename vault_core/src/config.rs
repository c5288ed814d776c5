//! Vault configuration, read from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vault_model::ReferencePolicy;

use crate::error::ConfigError;

/// Conventional attachment sub-folders, searched in order under the attachment root.
pub const DEFAULT_ATTACHMENT_FOLDERS: &[&str] = &[
    "attachments",
    "assets",
    "images",
    "media",
    "audio",
    "portraits",
    "maps",
];

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub vault: VaultSection,
    pub attachments: AttachmentSection,
    pub references: ReferenceSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSection {
    /// Directory holding all entity documents.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentSection {
    /// Overrides `vault.root` for attachment lookup.
    pub root: Option<PathBuf>,
    pub folders: Vec<String>,
}

impl Default for AttachmentSection {
    fn default() -> Self {
        Self {
            root: None,
            folders: DEFAULT_ATTACHMENT_FOLDERS
                .iter()
                .map(|folder| folder.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSection {
    pub policy: ReferencePolicy,
}

impl VaultConfig {
    /// Parse configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Root directory for attachment candidates.
    pub fn attachment_root(&self) -> Option<&Path> {
        self.attachments
            .root
            .as_deref()
            .or(self.vault.root.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::from_toml_str("").unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.references.policy, ReferencePolicy::Warn);
        assert_eq!(config.attachments.folders[0], "attachments");
        assert!(config.attachment_root().is_none());
    }

    #[test]
    fn test_full_config() {
        let config = VaultConfig::from_toml_str(
            r#"
            [vault]
            root = "/campaign"

            [attachments]
            folders = ["art"]

            [references]
            policy = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(config.attachment_root(), Some(Path::new("/campaign")));
        assert_eq!(config.attachments.folders, vec!["art".to_string()]);
        assert_eq!(config.references.policy, ReferencePolicy::Reject);
    }

    #[test]
    fn test_attachment_root_override() {
        let config = VaultConfig::from_toml_str(
            "[vault]\nroot = \"/campaign\"\n[attachments]\nroot = \"/media\"\n",
        )
        .unwrap();
        assert_eq!(config.attachment_root(), Some(Path::new("/media")));
        assert_eq!(config.attachments.folders.len(), DEFAULT_ATTACHMENT_FOLDERS.len());
    }

    #[test]
    fn test_invalid_policy() {
        let err = VaultConfig::from_toml_str("[references]\npolicy = \"ignore\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[references]\npolicy = \"store\"").unwrap();
        let config = VaultConfig::from_file(file.path()).unwrap();
        assert_eq!(config.references.policy, ReferencePolicy::StoreAsIs);
        assert!(VaultConfig::from_file("/no/such/vault.toml").is_err());
    }
}
