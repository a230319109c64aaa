//! Project dependency links (`dependencies.yml`)

use crate::relocation::RelocationError;
use crate::storage::FileManager;
use meshcut_core::{Change, ChangeSet, EntityType, Operation};
use meshcut_document::DocumentError;
use serde_yaml::{Mapping, Value};
use std::path::Path;

pub const DEPENDENCIES_FILE: &str = "dependencies.yml";

/// Records cross-project dependencies so two-part refs resolve
pub struct DependencyLinker;

impl DependencyLinker {
    /// Add `project` to the `projects` list of the dependencies file under the read root
    ///
    /// Returns `false` when the link already exists.
    pub fn link(
        files: &mut FileManager,
        project: &str,
        changes: &mut ChangeSet,
    ) -> Result<bool, RelocationError> {
        let path = Path::new(DEPENDENCIES_FILE);
        let existed = files.source_exists(path);

        let mut dependencies: Mapping = if existed {
            let text = files.read_text(path)?;
            serde_yaml::from_str::<Option<Mapping>>(&text)
                .map_err(|e| DocumentError::ParseError(e.to_string()))?
                .unwrap_or_default()
        } else {
            Mapping::new()
        };

        let mut projects = match dependencies.get("projects") {
            Some(Value::Sequence(projects)) => projects.clone(),
            _ => Vec::new(),
        };

        let linked = projects
            .iter()
            .any(|p| p.get("name").and_then(Value::as_str) == Some(project));
        if linked {
            tracing::debug!(project, "dependency already declared");
            return Ok(false);
        }

        let mut entry = Mapping::new();
        entry.insert(Value::from("name"), Value::from(project));
        projects.push(Value::Mapping(entry));
        dependencies.insert(Value::from("projects"), Value::Sequence(projects));

        let text = serde_yaml::to_string(&dependencies)
            .map_err(|e| DocumentError::SerializeError(e.to_string()))?;
        files.update_text(path, text);

        let operation = if existed { Operation::Update } else { Operation::Add };
        changes.push(
            Change::new(operation, EntityType::Project, project, files.source_path(path))
                .with_data(serde_json::json!({ "projects": [project] })),
        );
        tracing::info!(project, "declared project dependency");

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_idempotent_and_keeps_packages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEPENDENCIES_FILE),
            "packages:\n  - package: dbt-labs/dbt_utils\n    version: 1.1.1\n",
        )
        .unwrap();

        let mut files = FileManager::in_place(dir.path());
        let mut changes = ChangeSet::new();
        assert!(DependencyLinker::link(&mut files, "finance", &mut changes).unwrap());
        assert!(!DependencyLinker::link(&mut files, "finance", &mut changes).unwrap());
        files.flush().unwrap();

        let written: Mapping =
            serde_yaml::from_str(&std::fs::read_to_string(dir.path().join(DEPENDENCIES_FILE)).unwrap())
                .unwrap();
        assert_eq!(written.get("packages").and_then(Value::as_sequence).map(Vec::len), Some(1));
        assert_eq!(written.get("projects").and_then(Value::as_sequence).map(Vec::len), Some(1));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.count(Operation::Update), 1);
    }

    #[test]
    fn creates_missing_dependencies_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileManager::in_place(dir.path());
        let mut changes = ChangeSet::new();

        DependencyLinker::link(&mut files, "finance", &mut changes).unwrap();
        files.flush().unwrap();

        let written = std::fs::read_to_string(dir.path().join(DEPENDENCIES_FILE)).unwrap();
        assert!(written.contains("name: finance"));
        assert_eq!(changes.count(Operation::Add), 1);
    }
}
