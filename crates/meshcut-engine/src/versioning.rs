//! Model versioning
//!
//! Appends a version to a model declaration and lays out the code files to
//! match: `orders.sql` becomes `orders_v1.sql` on the first bump, and every
//! later bump writes the current code into a new `orders_v<n>.sql`.

use crate::relocation::{declaration_path, RelocationError};
use crate::storage::FileManager;
use meshcut_core::{Change, ChangeSet, Config, EntityType, Operation, Resource, ResourceKind, ResourceTable};
use meshcut_document::merge::versioned_stem;
use meshcut_document::{DocumentMerger, VersionBump};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Adds versions to models
pub struct ModelVersioner<'a> {
    config: &'a Config,
}

impl<'a> ModelVersioner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Node holding a model's current code: its latest version, or the only node
    pub fn current_node<'r>(resources: &'r ResourceTable, name: &str) -> Option<&'r Resource> {
        let mut models: Vec<&Resource> = resources
            .find_by_name(name)
            .filter(|r| r.kind == ResourceKind::Model)
            .collect();

        if models.len() <= 1 {
            return models.pop();
        }

        models.iter().copied().find(|model| {
            model
                .latest_version
                .is_some_and(|latest| model.unique_id.ends_with(&format!(".v{latest}")))
        })
    }

    /// Append a version to `model` and stage the matching file changes
    pub fn add_version(
        &self,
        model: &Resource,
        prerelease: bool,
        defined_in: Option<&str>,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<VersionBump, RelocationError> {
        if model.kind != ResourceKind::Model {
            return Err(RelocationError::NotAModel(model.unique_id.clone()));
        }
        let code_path = model
            .code_path
            .clone()
            .ok_or_else(|| RelocationError::MissingCodeFile(model.unique_id.clone()))?;
        let declaration = declaration_path(model, self.config)
            .ok_or_else(|| RelocationError::MissingDeclaration(model.unique_id.clone()))?;

        // Read before the document edit so a missing file fails the run untouched
        let code = files.read_text(&code_path)?;

        let bump = DocumentMerger::append_version(
            files.read_document(&declaration)?,
            &model.name,
            prerelease,
            defined_in,
        )?;
        changes.push(
            Change::new(
                Operation::Update,
                EntityType::Model,
                &model.unique_id,
                files.source_path(&declaration),
            )
            .with_data(json!({
                "version": bump.version,
                "latest_version": bump.latest_version,
                "prerelease": prerelease,
            })),
        );

        let extension = model.file_extension();
        let sibling = |stem: &str| -> PathBuf {
            code_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(format!("{stem}.{extension}"))
        };
        let new_file = sibling(&bump.file_stem(&model.name));

        match bump.previous_latest {
            None => {
                if new_file != code_path {
                    self.rename(model, &code_path, &new_file, files, changes)?;
                }
            }
            Some(previous) => {
                let previous_file = sibling(&versioned_stem(&model.name, previous));
                if previous_file != code_path && previous_file != new_file {
                    self.rename(model, &code_path, &previous_file, files, changes)?;
                }

                files.update_text(&new_file, code);
                changes.push(
                    Change::new(
                        Operation::Add,
                        EntityType::Code,
                        &model.unique_id,
                        files.source_path(&new_file),
                    )
                    .with_data(json!({ "version": bump.version })),
                );
            }
        }

        tracing::info!(
            model = %model.unique_id,
            version = bump.version,
            latest = bump.latest_version,
            "added model version"
        );

        Ok(bump)
    }

    fn rename(
        &self,
        model: &Resource,
        from: &Path,
        to: &Path,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<(), RelocationError> {
        let digest = files.rename(from, to)?;

        changes.push(Change::new(
            Operation::Remove,
            EntityType::Code,
            &model.unique_id,
            files.source_path(from),
        ));
        changes.push(
            Change::new(
                Operation::Add,
                EntityType::Code,
                &model.unique_id,
                files.source_path(to),
            )
            .with_data(json!({ "sha256": digest, "renamed_from": from })),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_node_prefers_latest_version() {
        let mut v1 = Resource::new("model.shop.orders.v1", ResourceKind::Model).with_name("orders");
        v1.latest_version = Some(2);
        let mut v2 = Resource::new("model.shop.orders.v2", ResourceKind::Model).with_name("orders");
        v2.latest_version = Some(2);
        let resources: ResourceTable = [v1, v2].into_iter().collect();

        let current = ModelVersioner::current_node(&resources, "orders").unwrap();
        assert_eq!(current.unique_id, "model.shop.orders.v2");
        assert!(ModelVersioner::current_node(&resources, "customers").is_none());
    }

    #[test]
    fn current_node_is_independent_of_the_name_buffer() {
        let resources: ResourceTable =
            [Resource::new("model.shop.orders", ResourceKind::Model).with_code_path("models/orders.sql")]
                .into_iter()
                .collect();

        let current = {
            let name = String::from("orders");
            ModelVersioner::current_node(&resources, &name)
        };
        assert_eq!(current.map(|r| r.unique_id.as_str()), Some("model.shop.orders"));
    }

    #[test]
    fn only_models_are_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let seed = Resource::new("seed.shop.countries", ResourceKind::Seed)
            .with_code_path("seeds/countries.csv");

        let err = ModelVersioner::new(&config)
            .add_version(
                &seed,
                false,
                None,
                &mut FileManager::in_place(dir.path()),
                &mut ChangeSet::new(),
            )
            .unwrap_err();
        assert!(matches!(err, RelocationError::NotAModel(_)));
    }
}
