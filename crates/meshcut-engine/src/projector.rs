//! Subproject configuration
//!
//! A new subproject starts from its parent's `dbt_project.yml`, renamed, with
//! deprecated keys and empty values dropped. `packages.yml` is copied as is.

use crate::storage::{FileManager, StorageError};
use meshcut_core::{Change, ChangeSet, EntityType, Operation};
use meshcut_dbt::project::PROJECT_FILE;
use serde_json::json;
use serde_yaml::{Mapping, Value};
use std::path::Path;

pub const PACKAGES_FILE: &str = "packages.yml";

/// Keys never carried into a subproject
const DROPPED_KEYS: &[&str] = &["version", "query-comment"];

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        Value::Mapping(m) => m.is_empty(),
        _ => false,
    }
}

pub struct ProjectConfigProjector;

impl ProjectConfigProjector {
    /// Derive the subproject's `dbt_project.yml` from the parent's
    pub fn project(parent: &Mapping, name: &str) -> Mapping {
        let mut projected: Mapping = parent
            .iter()
            .filter(|(key, _)| !key.as_str().is_some_and(|k| DROPPED_KEYS.contains(&k)))
            .filter(|(_, value)| !is_empty_value(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        projected.insert(Value::from("name"), Value::from(name));
        projected
    }

    /// Stage the projected project file and the copied package list under the write root
    pub fn write(
        parent: &Mapping,
        name: &str,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<(), ProjectionError> {
        let projected = Self::project(parent, name);
        let text = serde_yaml::to_string(&projected)
            .map_err(|e| ProjectionError::SerializeError(e.to_string()))?;

        let project_file = Path::new(PROJECT_FILE);
        files.write_text(project_file, text);
        changes.push(
            Change::new(
                Operation::Add,
                EntityType::Project,
                name,
                files.target_path(project_file),
            )
            .with_serialized(&projected)
            .map_err(|e| ProjectionError::SerializeError(e.to_string()))?,
        );

        let packages = Path::new(PACKAGES_FILE);
        if files.source_exists(packages) {
            let digest = files.copy(packages)?;
            changes.push(
                Change::new(Operation::Add, EntityType::Code, name, files.target_path(packages))
                    .with_data(json!({ "sha256": digest })),
            );
        } else {
            tracing::warn!(project = name, "parent project has no packages.yml, nothing to copy");
        }

        tracing::info!(project = name, root = %files.write_root().display(), "wrote subproject configuration");
        Ok(())
    }
}

/// Projection errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Failed to serialize project file: {0}")]
    SerializeError(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parent() -> Mapping {
        serde_yaml::from_str(
            r#"
name: shop
version: '1.0.0'
config-version: 2
profile: shop
query-comment: "-- run by {{ target.user }}"
model-paths: ["models"]
vars: {}
on-run-start: []
clean-targets: ["target", "dbt_packages"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn projection_renames_and_drops() {
        let projected = ProjectConfigProjector::project(&parent(), "finance");
        let keys: Vec<&str> = projected.keys().filter_map(Value::as_str).collect();

        assert_eq!(
            keys,
            vec!["name", "config-version", "profile", "model-paths", "clean-targets"]
        );
        assert_eq!(projected.get("name"), Some(&Value::from("finance")));
    }

    #[test]
    fn write_copies_packages_byte_for_byte() {
        let parent_dir = tempfile::tempdir().unwrap();
        let child_dir = tempfile::tempdir().unwrap();
        let packages = "packages:\n  - package: dbt-labs/dbt_utils   # pinned\n    version: 1.1.1\n";
        std::fs::write(parent_dir.path().join(PACKAGES_FILE), packages).unwrap();

        let mut files = FileManager::new(parent_dir.path(), child_dir.path());
        let mut changes = ChangeSet::new();
        ProjectConfigProjector::write(&parent(), "finance", &mut files, &mut changes).unwrap();
        files.flush().unwrap();

        assert_eq!(
            std::fs::read_to_string(child_dir.path().join(PACKAGES_FILE)).unwrap(),
            packages
        );
        let project: Mapping = serde_yaml::from_str(
            &std::fs::read_to_string(child_dir.path().join(PROJECT_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(project.get("name"), Some(&Value::from("finance")));
        assert_eq!(changes.count(Operation::Add), 2);
    }

    #[test]
    fn missing_packages_file_is_not_an_error() {
        let parent_dir = tempfile::tempdir().unwrap();
        let child_dir = tempfile::tempdir().unwrap();

        let mut files = FileManager::new(parent_dir.path(), child_dir.path());
        let mut changes = ChangeSet::new();
        ProjectConfigProjector::write(&parent(), "finance", &mut files, &mut changes).unwrap();

        assert_eq!(changes.len(), 1);
    }
}
