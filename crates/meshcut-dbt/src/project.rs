//! dbt project discovery

use crate::catalog::{Catalog, CatalogError};
use crate::manifest::{Manifest, ManifestError};
use meshcut_core::Config;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

pub const PROJECT_FILE: &str = "dbt_project.yml";

/// A dbt project rooted at a directory holding `dbt_project.yml`
#[derive(Debug, Clone, PartialEq)]
pub struct DbtProject {
    pub root: PathBuf,

    /// Project name from `dbt_project.yml`
    pub name: String,

    /// Parsed `dbt_project.yml`
    pub config: Mapping,
}

impl DbtProject {
    /// Check whether a directory holds a dbt project
    pub fn is_project_dir(path: &Path) -> bool {
        path.join(PROJECT_FILE).is_file()
    }

    /// Load the project rooted at `path`
    pub fn from_directory(path: &Path) -> Result<Self, ProjectError> {
        if !Self::is_project_dir(path) {
            return Err(ProjectError::NotADbtProject(path.display().to_string()));
        }

        let project_file = path.join(PROJECT_FILE);
        let contents = std::fs::read_to_string(&project_file)
            .map_err(|e| ProjectError::IoError(project_file.display().to_string(), e.to_string()))?;

        let config: Mapping = serde_yaml::from_str(&contents)
            .map_err(|e| ProjectError::ParseError(project_file.display().to_string(), e.to_string()))?;

        let name = match config.get("name") {
            Some(Value::String(name)) => name.clone(),
            _ => {
                return Err(ProjectError::ParseError(
                    project_file.display().to_string(),
                    "missing 'name'".to_string(),
                ))
            }
        };

        tracing::debug!(project = %name, root = %path.display(), "loaded dbt project");

        Ok(Self {
            root: path.to_path_buf(),
            name,
            config,
        })
    }

    pub fn project_file(&self) -> PathBuf {
        self.root.join(PROJECT_FILE)
    }

    /// Load the manifest at the configured location under this project
    pub fn load_manifest(&self, config: &Config) -> Result<Manifest, ManifestError> {
        Manifest::from_file(&self.root.join(&config.manifest_path))
    }

    /// Load the catalog at the configured location under this project
    pub fn load_catalog(&self, config: &Config) -> Result<Catalog, CatalogError> {
        Catalog::from_file(&self.root.join(&config.catalog_path))
    }
}

/// Project discovery errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Directory {0} does not contain a dbt project (no dbt_project.yml)")]
    NotADbtProject(String),

    #[error("Failed to read {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_project_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_FILE),
            "name: shop\nversion: '1.0'\nprofile: shop\n",
        )
        .unwrap();

        let project = DbtProject::from_directory(dir.path()).unwrap();
        assert_eq!(project.name, "shop");
        assert_eq!(project.config.get("profile"), Some(&Value::from("shop")));
    }

    #[test]
    fn directory_without_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DbtProject::from_directory(dir.path()).unwrap_err();

        assert!(matches!(err, ProjectError::NotADbtProject(_)));
        assert!(err.to_string().contains("does not contain a dbt project"));
    }

    #[test]
    fn project_file_without_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), "profile: shop\n").unwrap();

        assert!(matches!(
            DbtProject::from_directory(dir.path()),
            Err(ProjectError::ParseError(..))
        ));
    }
}
