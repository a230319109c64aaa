//! `split` and `connect`
//!
//! Both relocate a selection (plus the parent's macros it calls) out of a
//! parent project. `split` creates the target project; `connect` moves into
//! one that already exists.

use crate::linker::DependencyLinker;
use crate::projector::{ProjectConfigProjector, ProjectionError};
use crate::relocation::{RelocationError, RelocationOutcome, ResourceRelocationOrchestrator};
use crate::storage::FileManager;
use meshcut_core::{Config, ResourceTable};
use meshcut_dbt::{CatalogLookup, DbtProject, DependencyGraph, ProjectError};
use std::collections::BTreeSet;

/// Builds subprojects out of a parent project
pub struct SubprojectBuilder<'a> {
    parent: &'a DbtProject,
    resources: &'a ResourceTable,
    graph: &'a DependencyGraph,
    config: &'a Config,
    catalog: Option<&'a dyn CatalogLookup>,
}

impl<'a> SubprojectBuilder<'a> {
    pub fn new(
        parent: &'a DbtProject,
        resources: &'a ResourceTable,
        graph: &'a DependencyGraph,
        config: &'a Config,
    ) -> Self {
        Self {
            parent,
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

    /// Create project `name` at the write root of `files` and move `selection` into it
    pub fn split(
        &self,
        selection: &BTreeSet<String>,
        name: &str,
        files: &mut FileManager,
    ) -> Result<RelocationOutcome, SubprojectError> {
        let target = files.write_root().to_path_buf();
        if DbtProject::is_project_dir(&target) {
            return Err(SubprojectError::TargetIsProject(target.display().to_string()));
        }

        tracing::info!(subproject = name, target = %target.display(), "splitting project");
        let mut outcome = self.relocate(selection, name, files)?;
        ProjectConfigProjector::write(&self.parent.config, name, files, &mut outcome.changes)?;

        Ok(outcome)
    }

    /// Move `selection` into the existing project at the write root of `files`
    pub fn connect(
        &self,
        selection: &BTreeSet<String>,
        files: &mut FileManager,
    ) -> Result<RelocationOutcome, SubprojectError> {
        let target = DbtProject::from_directory(files.write_root())?;

        tracing::info!(subproject = %target.name, target = %target.root.display(), "connecting project");
        self.relocate(selection, &target.name, files)
    }

    fn relocate(
        &self,
        selection: &BTreeSet<String>,
        name: &str,
        files: &mut FileManager,
    ) -> Result<RelocationOutcome, SubprojectError> {
        let mut orchestrator = ResourceRelocationOrchestrator::new(
            &self.parent.name,
            name,
            self.resources,
            self.graph,
            self.config,
        );
        if let Some(catalog) = self.catalog {
            orchestrator = orchestrator.with_catalog(catalog);
        }

        let mut selection = selection.clone();
        let macros = orchestrator.custom_macros(&selection);
        if !macros.is_empty() {
            tracing::debug!(count = macros.len(), "adding custom macros to the selection");
        }
        selection.extend(macros);

        let mut outcome = orchestrator.relocate(&selection, files)?;

        if !outcome.interface.is_empty() {
            DependencyLinker::link(files, name, &mut outcome.changes)?;
        }

        Ok(outcome)
    }
}

/// Subproject errors
#[derive(Debug, thiserror::Error)]
pub enum SubprojectError {
    #[error("Directory {0} already contains a dbt project. Use 'connect' to move resources into it")]
    TargetIsProject(String),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Relocation(#[from] RelocationError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}
