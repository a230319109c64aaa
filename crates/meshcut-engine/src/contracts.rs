//! Contract stamping against catalog observations

use crate::relocation::{declaration_path, RelocationError};
use crate::storage::FileManager;
use meshcut_core::{
    Change, ChangeSet, Config, EntityType, ObservedColumn, Operation, Resource, ResourceKind,
    ResourceTable,
};
use meshcut_dbt::CatalogLookup;
use meshcut_document::DocumentMerger;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Stamps enforced contracts onto model declarations
pub struct ContractStamper<'a> {
    config: &'a Config,
    catalog: Option<&'a dyn CatalogLookup>,
}

impl<'a> ContractStamper<'a> {
    pub fn new(config: &'a Config, catalog: Option<&'a dyn CatalogLookup>) -> Self {
        Self { config, catalog }
    }

    /// Observed columns for every resource, failing on the first the catalog cannot answer
    pub fn observe<'r>(
        &self,
        resources: impl IntoIterator<Item = &'r Resource>,
    ) -> Result<BTreeMap<String, Vec<ObservedColumn>>, RelocationError> {
        let mut observed = BTreeMap::new();

        for resource in resources {
            let catalog = self
                .catalog
                .ok_or_else(|| RelocationError::MissingCatalog(resource.unique_id.clone()))?;
            let columns = catalog
                .observed_columns(&resource.unique_id)
                .ok_or_else(|| RelocationError::MissingCatalog(resource.unique_id.clone()))?;
            observed.insert(resource.unique_id.clone(), columns);
        }

        Ok(observed)
    }

    /// Stamp one model's declaration, returning the document path
    pub fn stamp(
        &self,
        resource: &Resource,
        columns: &[ObservedColumn],
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<PathBuf, RelocationError> {
        let path = declaration_path(resource, self.config)
            .ok_or_else(|| RelocationError::MissingDeclaration(resource.unique_id.clone()))?;

        DocumentMerger::stamp_contract(files.read_document(&path)?, &resource.name, columns)?;

        tracing::info!(model = %resource.unique_id, path = %path.display(), "enforced contract");
        changes.push(
            Change::new(
                Operation::Update,
                EntityType::Model,
                &resource.unique_id,
                files.source_path(&path),
            )
            .with_data(json!({
                "contract": { "enforced": true },
                "columns": columns.iter().map(|c| c.name.to_lowercase()).collect::<Vec<_>>(),
            })),
        );

        Ok(path)
    }

    /// Stamp every selected model of `project`
    pub fn stamp_selection(
        &self,
        resources: &ResourceTable,
        selection: &BTreeSet<String>,
        project: &str,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<usize, RelocationError> {
        let models = selection
            .iter()
            .map(|id| {
                resources
                    .get(id)
                    .ok_or_else(|| RelocationError::ResourceNotFound(id.clone()))
            })
            .filter(|r| {
                r.as_ref()
                    .map_or(true, |r| r.kind == ResourceKind::Model && r.project == project)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Every model must be answerable before any document is edited
        let observed = self.observe(models.iter().copied())?;

        for model in &models {
            let columns = observed.get(&model.unique_id).map_or(&[][..], Vec::as_slice);
            self.stamp(model, columns, files, changes)?;
        }

        Ok(models.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn orders() -> Resource {
        Resource::new("model.shop.orders", ResourceKind::Model)
            .with_code_path("models/orders.sql")
            .with_declaration_path("models/_models.yml")
    }

    #[test]
    fn missing_catalog_fails_before_stamping() {
        let config = Config::default();
        let stamper = ContractStamper::new(&config, None);

        let err = stamper.observe([&orders()]).unwrap_err();
        assert!(matches!(err, RelocationError::MissingCatalog(id) if id == "model.shop.orders"));
    }

    #[test]
    fn unbuilt_model_counts_as_missing() {
        let config = Config::default();
        let catalog: BTreeMap<String, Vec<ObservedColumn>> = BTreeMap::new();
        let stamper = ContractStamper::new(&config, Some(&catalog));

        assert!(stamper.observe([&orders()]).is_err());
    }

    #[test]
    fn stamp_selection_edits_the_declaration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(
            dir.path().join("models/_models.yml"),
            "version: 2\nmodels:\n  - name: orders\n",
        )
        .unwrap();

        let config = Config::default();
        let catalog: BTreeMap<String, Vec<ObservedColumn>> = [(
            "model.shop.orders".to_string(),
            vec![ObservedColumn::new("ID", "INTEGER")],
        )]
        .into_iter()
        .collect();
        let resources: ResourceTable = [orders()].into_iter().collect();
        let selection: BTreeSet<String> = ["model.shop.orders".to_string()].into_iter().collect();

        let mut files = FileManager::in_place(dir.path());
        let mut changes = ChangeSet::new();
        let stamped = ContractStamper::new(&config, Some(&catalog))
            .stamp_selection(&resources, &selection, "shop", &mut files, &mut changes)
            .unwrap();
        files.flush().unwrap();

        assert_eq!(stamped, 1);
        assert_eq!(changes.count(Operation::Update), 1);
        let written = std::fs::read_to_string(dir.path().join(Path::new("models/_models.yml"))).unwrap();
        assert!(written.contains("enforced: true"));
        assert!(written.contains("data_type: integer"));
    }
}
