//! Configuration schema (meshcut.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_manifest_path() -> PathBuf {
    PathBuf::from("target/manifest.json")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("target/catalog.json")
}

fn default_yml_file() -> String {
    "_models.yml".to_string()
}

fn default_group_yml_file() -> PathBuf {
    PathBuf::from("models/_groups.yml")
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Manifest location, relative to the project root
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Catalog location, relative to the project root
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Reuse an existing catalog instead of regenerating one
    #[serde(default)]
    pub read_catalog: bool,

    /// Declaration document created next to a resource that has none
    #[serde(default = "default_yml_file")]
    pub default_yml_file: String,

    /// Document receiving group definitions
    #[serde(default = "default_group_yml_file")]
    pub group_yml_file: PathBuf,

    /// Unique ids that are never relocated (glob patterns)
    #[serde(default)]
    pub skip_resources: Vec<String>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            catalog_path: default_catalog_path(),
            read_catalog: false,
            default_yml_file: default_yml_file(),
            group_yml_file: default_group_yml_file(),
            skip_resources: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Absolute manifest path
    pub fn manifest_file(&self) -> PathBuf {
        self.project_root.join(&self.manifest_path)
    }

    /// Absolute catalog path
    pub fn catalog_file(&self) -> PathBuf {
        self.project_root.join(&self.catalog_path)
    }

    /// Check if a resource must never be relocated
    pub fn is_skipped(&self, unique_id: &str) -> bool {
        self.skip_resources.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, unique_id)
            } else {
                pattern == unique_id
            }
        })
    }
}

/// Simple glob matching (`*` matches any run of characters)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return text.is_empty(),
    };

    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };

    for (i, part) in rest.iter().enumerate() {
        let is_last = i == rest.len() - 1;
        if is_last {
            return remaining.ends_with(part);
        }
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }

    remaining.is_empty()
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
