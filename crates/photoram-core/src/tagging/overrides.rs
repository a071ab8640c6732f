//! Display-name overrides for raw tag names.
//!
//! The override file is a flat JSON object, `{"raw name": "display name"}`.
//! Lookups are read-only and a missing key passes the raw name through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;

/// Raw tag name to display name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideMap {
    entries: HashMap<String, String>,
}

impl OverrideMap {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Resolve the override file for a config and load it.
    ///
    /// An explicitly configured file must exist and parse. The default file
    /// in the config directory is optional.
    pub fn for_config(config: &Config) -> Result<Self, ConfigError> {
        match config.overrides_path() {
            Some(path) => Self::load(&path),
            None => Self::load_optional(&Config::default_overrides_path()),
        }
    }

    /// Load a required override file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Overrides {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Load an override file if present; absence yields an empty map.
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let entries: HashMap<String, String> =
            serde_json::from_str(content).map_err(|e| ConfigError::Overrides {
                path: PathBuf::from(path),
                message: e.to_string(),
            })?;
        tracing::debug!("Loaded {} tag overrides from {:?}", entries.len(), path);
        Ok(Self { entries })
    }

    /// Display name for `raw`, or `raw` itself.
    pub fn apply<'a>(&'a self, raw: &'a str) -> &'a str {
        self.entries.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_passthrough() {
        let map = OverrideMap::new(HashMap::from([(
            "golden retriever".to_string(),
            "Golden Retriever".to_string(),
        )]));
        assert_eq!(map.apply("golden retriever"), "Golden Retriever");
        assert_eq!(map.apply("tabby"), "tabby");
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override_labels.json");
        std::fs::write(&path, r#"{"seashore": "beach", "tabby": "猫"}"#).unwrap();

        let map = OverrideMap::load(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.apply("tabby"), "猫");
    }

    #[test]
    fn test_optional_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let map = OverrideMap::load_optional(&dir.path().join("absent.json")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OverrideMap::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Overrides { .. }));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"["not", "an", "object"]"#).unwrap();
        assert!(matches!(
            OverrideMap::load(&path),
            Err(ConfigError::Overrides { .. })
        ));
    }

    #[test]
    fn test_for_config_uses_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mine.json");
        std::fs::write(&path, r#"{"a": "b"}"#).unwrap();

        let mut config = Config::default();
        config.tagging.overrides = Some(path);
        assert_eq!(OverrideMap::for_config(&config).unwrap().apply("a"), "b");
    }
}
