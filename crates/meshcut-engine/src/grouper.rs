//! Ownership groups
//!
//! Puts a selection of models into a group. Models consumed from outside the
//! group become public and contracted; the rest become private.

use crate::boundary::{GraphBoundaryResolver, OwnerFilter};
use crate::contracts::ContractStamper;
use crate::relocation::{declaration_path, RelocationError};
use crate::storage::FileManager;
use meshcut_core::{
    AccessLevel, Change, ChangeSet, Config, EntityType, Group, Operation, ResourceKind,
    ResourceTable,
};
use meshcut_dbt::{CatalogLookup, DependencyGraph};
use meshcut_document::DocumentMerger;
use serde_json::json;
use std::collections::BTreeSet;

pub struct ResourceGrouper<'a> {
    project: &'a str,
    resources: &'a ResourceTable,
    graph: &'a DependencyGraph,
    config: &'a Config,
    catalog: Option<&'a dyn CatalogLookup>,
}

impl<'a> ResourceGrouper<'a> {
    pub fn new(
        project: &'a str,
        resources: &'a ResourceTable,
        graph: &'a DependencyGraph,
        config: &'a Config,
    ) -> Self {
        Self {
            project,
            resources,
            graph,
            config,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: &'a dyn CatalogLookup) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Assign `selection` to `group`, returning the group's interface
    pub fn group(
        &self,
        selection: &BTreeSet<String>,
        group: &Group,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<BTreeSet<String>, RelocationError> {
        if !group.has_owner() {
            return Err(RelocationError::GroupWithoutOwner(group.name.clone()));
        }

        let mut models = Vec::new();
        for id in selection {
            let resource = self
                .resources
                .get(id)
                .ok_or_else(|| RelocationError::ResourceNotFound(id.clone()))?;
            if resource.kind == ResourceKind::Model && resource.project == self.project {
                models.push(resource);
            }
        }

        let interface = GraphBoundaryResolver::resolve(
            self.graph,
            selection,
            &OwnerFilter::new(self.project),
            self.resources,
        )?;

        let stamper = ContractStamper::new(self.config, self.catalog);
        let observed = stamper.observe(models.iter().copied().filter(|m| interface.contains(&m.unique_id)))?;

        // Declarations are resolved up front so a model without one fails the run untouched
        let declarations = models
            .iter()
            .map(|model| {
                declaration_path(model, self.config)
                    .map(|path| (*model, path))
                    .ok_or_else(|| RelocationError::MissingDeclaration(model.unique_id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let registry = self.config.group_yml_file.clone();
        DocumentMerger::upsert_group(files.read_document(&registry)?, group)?;
        changes.push(
            Change::new(
                Operation::Add,
                EntityType::Group,
                format!("group.{}.{}", self.project, group.name),
                files.source_path(&registry),
            )
            .with_serialized(group)?,
        );

        for (model, path) in declarations {
            let access = if interface.contains(&model.unique_id) {
                AccessLevel::Public
            } else {
                AccessLevel::Private
            };

            DocumentMerger::stamp_group_and_access(
                files.read_document(&path)?,
                &model.name,
                access,
                Some(&group.name),
            )?;
            changes.push(
                Change::new(
                    Operation::Update,
                    EntityType::Model,
                    &model.unique_id,
                    files.source_path(&path),
                )
                .with_data(json!({ "access": access.as_str(), "group": group.name })),
            );

            if let Some(columns) = observed.get(&model.unique_id) {
                stamper.stamp(model, columns, files, changes)?;
            }
        }

        tracing::info!(
            group = %group.name,
            models = models.len(),
            public = interface.len(),
            "grouped models"
        );

        Ok(interface)
    }
}
