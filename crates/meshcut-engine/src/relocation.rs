//! Resource relocation
//!
//! Moves a selection out of a parent project into a subproject. Each
//! resource gets one disposition, decided by its kind:
//!
//! | Kind                                   | Disposition                    |
//! |----------------------------------------|--------------------------------|
//! | generic test, test of a moved resource | skipped (travels with parent)  |
//! | model, analysis, test, snapshot, seed  | code file and entry move       |
//! | macro                                  | code file and entry are copied |
//! | source, exposure, metric, ...          | entry moves                    |
//! | doc block, other                       | skipped                        |
//!
//! Interface models are contracted and made public before anything moves,
//! and the models staying behind are rewritten to reference them through the
//! subproject. All validation (ids, boundary, catalog) happens before the
//! first staged edit.

use crate::boundary::{BoundaryError, GraphBoundaryResolver, OwnerFilter};
use crate::contracts::ContractStamper;
use crate::references::ReferenceRewriter;
use crate::storage::{FileManager, StorageError};
use meshcut_core::{
    AccessLevel, Change, ChangeSet, Config, EntityType, Operation, Resource, ResourceKind,
    ResourceTable,
};
use meshcut_dbt::{CatalogLookup, DependencyGraph};
use meshcut_document::{DocumentError, DocumentMerger};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Declaration document of a resource, relative to its project root
///
/// Models without one get the default document next to their code file.
pub fn declaration_path(resource: &Resource, config: &Config) -> Option<PathBuf> {
    if let Some(path) = &resource.declaration_path {
        return Some(path.clone());
    }

    if resource.kind.section().is_none() {
        return None;
    }

    resource
        .code_path
        .as_deref()
        .and_then(Path::parent)
        .map(|dir| dir.join(&config.default_yml_file))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Skip,
    Move,
    Copy,
    MoveEntry,
}

/// Everything a relocation run did
#[derive(Debug, Default)]
pub struct RelocationOutcome {
    pub changes: ChangeSet,

    /// Models exposed to the parent project
    pub interface: BTreeSet<String>,

    pub moved: Vec<String>,
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Relocates a selection from a parent project into a subproject
pub struct ResourceRelocationOrchestrator<'a> {
    parent_project: &'a str,
    subproject: &'a str,
    resources: &'a ResourceTable,
    graph: &'a DependencyGraph,
    config: &'a Config,
    catalog: Option<&'a dyn CatalogLookup>,
}

impl<'a> ResourceRelocationOrchestrator<'a> {
    pub fn new(
        parent_project: &'a str,
        subproject: &'a str,
        resources: &'a ResourceTable,
        graph: &'a DependencyGraph,
        config: &'a Config,
    ) -> Self {
        Self {
            parent_project,
            subproject,
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

    fn resource(&self, unique_id: &str) -> Result<&'a Resource, RelocationError> {
        self.resources
            .get(unique_id)
            .ok_or_else(|| RelocationError::ResourceNotFound(unique_id.to_string()))
    }

    /// Parent-project macros the selection calls, followed transitively
    pub fn custom_macros(&self, selection: &BTreeSet<String>) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut pending: Vec<&str> = selection
            .iter()
            .filter_map(|id| self.resources.get(id))
            .flat_map(|r| r.macro_dependencies.iter().map(String::as_str))
            .collect();

        while let Some(id) = pending.pop() {
            let Some(macro_) = self.resources.get(id) else {
                continue;
            };
            if macro_.project != self.parent_project || !found.insert(id.to_string()) {
                continue;
            }
            pending.extend(macro_.macro_dependencies.iter().map(String::as_str));
        }

        found.retain(|id| !selection.contains(id));
        found
    }

    fn disposition(&self, resource: &Resource, selection: &BTreeSet<String>) -> Disposition {
        match resource.kind {
            ResourceKind::Test if resource.is_generic_test() => Disposition::Skip,
            ResourceKind::Test
                if resource.code_path.is_none()
                    && resource
                        .attached_node
                        .as_ref()
                        .is_some_and(|node| selection.contains(node)) =>
            {
                Disposition::Skip
            }
            ResourceKind::Macro => Disposition::Copy,
            kind if kind.is_code_bearing() => Disposition::Move,
            ResourceKind::Documentation | ResourceKind::Other => Disposition::Skip,
            _ => Disposition::MoveEntry,
        }
    }

    /// Relocate `selection`, staging every edit in `files`
    ///
    /// `files` reads from the parent project and writes into the subproject.
    pub fn relocate(
        &self,
        selection: &BTreeSet<String>,
        files: &mut FileManager,
    ) -> Result<RelocationOutcome, RelocationError> {
        let mut selection = selection.clone();
        for id in &selection {
            self.resource(id)?;
        }
        selection.retain(|id| {
            let skipped = self.config.is_skipped(id);
            if skipped {
                tracing::info!(resource = %id, "skipped by configuration");
            }
            !skipped
        });

        let interface = GraphBoundaryResolver::resolve(
            self.graph,
            &selection,
            &OwnerFilter::new(self.parent_project),
            self.resources,
        )?;

        let stamper = ContractStamper::new(self.config, self.catalog);
        let interface_models = interface
            .iter()
            .map(|id| self.resource(id))
            .collect::<Result<Vec<_>, _>>()?;
        let observed = stamper.observe(interface_models.iter().copied())?;

        let rewriters = interface_models
            .iter()
            .map(|model| ReferenceRewriter::new(&model.name, self.subproject))
            .collect::<Result<Vec<_>, _>>()?;

        let mut plan = Vec::with_capacity(selection.len());
        for id in &selection {
            let resource = self.resource(id)?;
            let position = self.declared_at(resource, files)?;
            plan.push((position, resource, self.disposition(resource, &selection)));
        }
        // Entries sharing a document leave it in declaration order
        plan.sort_by(|a, b| a.0.cmp(&b.0));

        let mut outcome = RelocationOutcome {
            interface: interface.clone(),
            ..Default::default()
        };

        // Interface edits land before any file moves, so moved files carry them
        for (model, rewriter) in interface_models.iter().zip(&rewriters) {
            let columns = observed.get(&model.unique_id).map_or(&[][..], Vec::as_slice);
            let path = stamper.stamp(model, columns, files, &mut outcome.changes)?;
            DocumentMerger::stamp_group_and_access(
                files.read_document(&path)?,
                &model.name,
                AccessLevel::Public,
                None,
            )?;
            outcome.changes.push(
                Change::new(
                    Operation::Update,
                    EntityType::Model,
                    &model.unique_id,
                    files.source_path(&path),
                )
                .with_data(json!({ "access": AccessLevel::Public.as_str() })),
            );

            self.rewrite_dependents(model, rewriter, &selection, files, &mut outcome.changes)?;
        }

        for (_, resource, disposition) in plan {
            match disposition {
                Disposition::Skip => {
                    tracing::debug!(resource = %resource.unique_id, "not relocated on its own");
                    outcome.skipped.push(resource.unique_id.clone());
                }
                Disposition::Move => {
                    if let Some(code_path) = &resource.code_path {
                        self.move_code(resource, code_path, files, &mut outcome.changes)?;
                    }
                    self.move_entry(resource, files, &mut outcome.changes)?;
                    outcome.moved.push(resource.unique_id.clone());
                }
                Disposition::MoveEntry => {
                    self.move_entry(resource, files, &mut outcome.changes)?;
                    outcome.moved.push(resource.unique_id.clone());
                }
                Disposition::Copy => {
                    self.copy_resource(resource, files, &mut outcome.changes)?;
                    outcome.copied.push(resource.unique_id.clone());
                }
            }
        }

        for path in files.workspace().emptied_documents() {
            tracing::info!(path = %path.display(), "declaration document left empty, removing");
            outcome.changes.push(Change::new(
                Operation::Remove,
                EntityType::Code,
                path.display().to_string(),
                path,
            ));
        }

        Ok(outcome)
    }

    /// Declaration document of `resource` and the entry's place within it
    fn declared_at(
        &self,
        resource: &Resource,
        files: &mut FileManager,
    ) -> Result<Option<(PathBuf, usize, usize)>, RelocationError> {
        let (Some(section), Some(path)) =
            (resource.kind.section(), declaration_path(resource, self.config))
        else {
            return Ok(None);
        };

        let position = DocumentMerger::entry_position(
            files.view_document(&path)?,
            section,
            &resource.name,
            resource.source_name.as_deref(),
        );
        Ok(position.map(|(entry, table)| (path, entry, table)))
    }

    /// Point models staying in the parent project at the relocated model
    fn rewrite_dependents(
        &self,
        model: &Resource,
        rewriter: &ReferenceRewriter,
        selection: &BTreeSet<String>,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<(), RelocationError> {
        let dependents = self.resources.iter().filter(|r| {
            r.kind.is_code_bearing()
                && r.project == self.parent_project
                && !selection.contains(&r.unique_id)
                && r.depends_on.contains(&model.unique_id)
        });

        for dependent in dependents {
            let Some(code_path) = &dependent.code_path else {
                continue;
            };

            let code = files.read_text(code_path)?;
            let Some(rewritten) = rewriter.rewrite(&code) else {
                tracing::warn!(
                    resource = %dependent.unique_id,
                    model = %model.name,
                    "no single-argument ref to rewrite"
                );
                continue;
            };

            files.update_text(code_path, rewritten);
            changes.push(
                Change::new(
                    Operation::Update,
                    EntityType::Code,
                    &dependent.unique_id,
                    files.source_path(code_path),
                )
                .with_data(json!({ "ref": [self.subproject, model.name] })),
            );
        }

        Ok(())
    }

    fn move_code(
        &self,
        resource: &Resource,
        code_path: &Path,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<(), RelocationError> {
        let digest = files.move_file(code_path)?;
        tracing::info!(resource = %resource.unique_id, path = %code_path.display(), "moved code file");

        changes.push(Change::new(
            Operation::Remove,
            EntityType::Code,
            &resource.unique_id,
            files.source_path(code_path),
        ));
        changes.push(
            Change::new(
                Operation::Add,
                EntityType::Code,
                &resource.unique_id,
                files.target_path(code_path),
            )
            .with_data(json!({ "sha256": digest })),
        );

        Ok(())
    }

    fn move_entry(
        &self,
        resource: &Resource,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<(), RelocationError> {
        let (Some(section), Some(path)) =
            (resource.kind.section(), declaration_path(resource, self.config))
        else {
            return Ok(());
        };

        let fragment = DocumentMerger::extract_entry(
            files.read_document(&path)?,
            section,
            &resource.name,
            resource.source_name.as_deref(),
        )?;
        let Some(fragment) = fragment else {
            tracing::debug!(resource = %resource.unique_id, "no declaration entry to move");
            return Ok(());
        };

        let added = Change::new(
            Operation::Add,
            EntityType::from(resource.kind),
            &resource.unique_id,
            files.target_path(&path),
        )
        .with_serialized(&fragment)?;
        DocumentMerger::add_entry(files.target_document(&path)?, section, fragment)?;

        changes.push(Change::new(
            Operation::Remove,
            added.entity_type,
            &resource.unique_id,
            files.source_path(&path),
        ));
        changes.push(added);

        Ok(())
    }

    fn copy_resource(
        &self,
        resource: &Resource,
        files: &mut FileManager,
        changes: &mut ChangeSet,
    ) -> Result<(), RelocationError> {
        if let Some(code_path) = &resource.code_path {
            let digest = files.copy(code_path)?;
            changes.push(
                Change::new(
                    Operation::Add,
                    EntityType::Code,
                    &resource.unique_id,
                    files.target_path(code_path),
                )
                .with_data(json!({ "sha256": digest })),
            );
        }

        let (Some(section), Some(path)) = (resource.kind.section(), &resource.declaration_path)
        else {
            return Ok(());
        };

        let Some(entry) = files.view_document(path)?.entry(section, &resource.name).cloned() else {
            return Ok(());
        };
        let added = Change::new(
            Operation::Add,
            EntityType::from(resource.kind),
            &resource.unique_id,
            files.target_path(path),
        )
        .with_serialized(&entry)?;
        DocumentMerger::add_entry(files.target_document(path)?, section, entry)?;

        changes.push(added);

        Ok(())
    }

    /// Vendoring installed packages into the subproject is not supported
    pub fn copy_package_cache(&self) -> Result<(), RelocationError> {
        Err(RelocationError::Unimplemented("copy package cache"))
    }
}

/// Relocation errors
#[derive(Debug, thiserror::Error)]
pub enum RelocationError {
    #[error("Resource {0} not found in the project")]
    ResourceNotFound(String),

    #[error("No catalog entry for {0}. Build it and run 'dbt docs generate', or drop --read-catalog")]
    MissingCatalog(String),

    #[error("Resource {0} has no declaration document")]
    MissingDeclaration(String),

    #[error("Resource {0} has no code file")]
    MissingCodeFile(String),

    #[error("Resource {0} is not a model")]
    NotAModel(String),

    #[error("Group {0} needs an owner name or email")]
    GroupWithoutOwner(String),

    #[error("Not implemented: {0}")]
    Unimplemented(&'static str),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Invalid reference pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to record change payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_declaration_next_to_code() {
        let config = Config::default();
        let model = Resource::new("model.shop.orders", ResourceKind::Model)
            .with_code_path("models/marts/orders.sql");

        assert_eq!(
            declaration_path(&model, &config),
            Some(PathBuf::from("models/marts/_models.yml"))
        );

        let test = Resource::new("test.shop.assert_positive", ResourceKind::Test)
            .with_code_path("tests/assert_positive.sql");
        assert_eq!(declaration_path(&test, &config), None);
    }

    #[test]
    fn dispositions_by_kind() {
        let resources = ResourceTable::new();
        let graph = DependencyGraph::new();
        let config = Config::default();
        let orchestrator =
            ResourceRelocationOrchestrator::new("shop", "finance", &resources, &graph, &config);
        let selection: BTreeSet<String> = ["model.shop.orders".to_string()].into_iter().collect();

        let cases = [
            (
                Resource::new("test.shop.not_null_orders_id.abc123", ResourceKind::Test),
                Disposition::Skip,
            ),
            (
                Resource::new("test.shop.orders_positive", ResourceKind::Test)
                    .with_attached_node("model.shop.orders"),
                Disposition::Skip,
            ),
            (
                Resource::new("test.shop.assert_totals", ResourceKind::Test)
                    .with_code_path("tests/assert_totals.sql"),
                Disposition::Move,
            ),
            (Resource::new("model.shop.orders", ResourceKind::Model), Disposition::Move),
            (Resource::new("macro.shop.cents", ResourceKind::Macro), Disposition::Copy),
            (Resource::new("source.shop.raw.orders", ResourceKind::Source), Disposition::MoveEntry),
            (Resource::new("exposure.shop.board", ResourceKind::Exposure), Disposition::MoveEntry),
            (Resource::new("doc.shop.orders", ResourceKind::Documentation), Disposition::Skip),
        ];

        for (resource, expected) in cases {
            assert_eq!(
                orchestrator.disposition(&resource, &selection),
                expected,
                "{}",
                resource.unique_id
            );
        }
    }

    #[test]
    fn package_cache_copy_is_unimplemented() {
        let resources = ResourceTable::new();
        let graph = DependencyGraph::new();
        let config = Config::default();
        let orchestrator =
            ResourceRelocationOrchestrator::new("shop", "finance", &resources, &graph, &config);

        assert!(matches!(
            orchestrator.copy_package_cache(),
            Err(RelocationError::Unimplemented(_))
        ));
    }

    #[test]
    fn custom_macros_follow_macro_calls() {
        let mut model = Resource::new("model.shop.orders", ResourceKind::Model);
        model.macro_dependencies = vec![
            "macro.shop.cents_to_dollars".to_string(),
            "macro.dbt_utils.star".to_string(),
        ];
        let mut cents = Resource::new("macro.shop.cents_to_dollars", ResourceKind::Macro);
        cents.macro_dependencies = vec!["macro.shop.round_half".to_string()];

        let mut vendored = Resource::new("macro.dbt_utils.star", ResourceKind::Macro);
        vendored.project = "dbt_utils".to_string();

        let resources: ResourceTable = [
            model,
            cents,
            Resource::new("macro.shop.round_half", ResourceKind::Macro),
            vendored,
        ]
        .into_iter()
        .collect();
        let graph = DependencyGraph::new();
        let config = Config::default();
        let orchestrator =
            ResourceRelocationOrchestrator::new("shop", "finance", &resources, &graph, &config);

        let selection: BTreeSet<String> = ["model.shop.orders".to_string()].into_iter().collect();
        let macros: Vec<String> = orchestrator.custom_macros(&selection).into_iter().collect();
        assert_eq!(macros, vec!["macro.shop.cents_to_dollars", "macro.shop.round_half"]);
    }
}
