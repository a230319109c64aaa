//! Loading the dbt artifacts a command works from

use anyhow::{bail, Context, Result};
use colored::Colorize;
use meshcut_core::{Config, ResourceTable};
use meshcut_dbt::{Catalog, DbtProject, DependencyGraph};
use std::path::Path;
use std::process::Command;

/// How a command obtains observed column types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    /// The command never stamps contracts
    Skip,
    /// Reuse the catalog already on disk
    Read,
    /// Run `dbt docs generate` first
    Generate,
}

impl CatalogMode {
    pub fn from_flag(read_catalog: bool) -> Self {
        if read_catalog {
            Self::Read
        } else {
            Self::Generate
        }
    }
}

/// Everything a command needs to know about the parent project
pub struct ProjectArtifacts {
    pub project: DbtProject,
    pub resources: ResourceTable,
    pub graph: DependencyGraph,
    pub catalog: Option<Catalog>,
}

impl ProjectArtifacts {
    pub fn load(project_path: &Path, config: &Config, mode: CatalogMode, verbose: bool) -> Result<Self> {
        let project = DbtProject::from_directory(project_path)
            .with_context(|| format!("Failed to open project at {}", project_path.display()))?;

        if mode == CatalogMode::Generate {
            if verbose {
                eprintln!("{} dbt docs generate in {}", "Running".cyan(), project.root.display());
            }
            generate_docs(&project.root)?;
        }

        let manifest = project.load_manifest(config).with_context(|| {
            format!(
                "Failed to load manifest from {}. Run 'dbt parse' or 'dbt compile' first.",
                project.root.join(&config.manifest_path).display()
            )
        })?;

        let catalog = match mode {
            CatalogMode::Skip => None,
            CatalogMode::Read | CatalogMode::Generate => match project.load_catalog(config) {
                Ok(catalog) => Some(catalog),
                Err(e) => {
                    tracing::warn!(error = %e, "no usable catalog, contracts cannot be stamped");
                    None
                }
            },
        };

        let resources = manifest.resources();
        let graph = DependencyGraph::from_manifest(&manifest);

        if verbose {
            eprintln!(
                "{} {} resources, {} edges from {} (dbt {})",
                "Loaded".cyan(),
                resources.len(),
                graph.edge_count(),
                project.name,
                manifest.metadata.dbt_version
            );
        }

        Ok(Self {
            project,
            resources,
            graph,
            catalog,
        })
    }
}

fn generate_docs(root: &Path) -> Result<()> {
    let status = Command::new("dbt")
        .args(["docs", "generate"])
        .current_dir(root)
        .status()
        .context("Failed to run 'dbt docs generate'. Pass --read-catalog to reuse an existing catalog.")?;

    if !status.success() {
        bail!("'dbt docs generate' exited with {status}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_flag_selects_mode() {
        assert_eq!(CatalogMode::from_flag(true), CatalogMode::Read);
        assert_eq!(CatalogMode::from_flag(false), CatalogMode::Generate);
    }

    #[test]
    fn missing_project_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectArtifacts::load(dir.path(), &Config::default(), CatalogMode::Skip, false)
            .err()
            .unwrap();

        assert!(format!("{err:#}").contains("does not contain a dbt project"));
    }

    #[test]
    fn reads_manifest_without_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dbt_project.yml"), "name: shop\nversion: '1.0'\n").unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(
            dir.path().join("target/manifest.json"),
            r#"{
                "metadata": {"dbt_schema_version": "v12", "dbt_version": "1.8.0", "generated_at": "2026-01-01T00:00:00Z"},
                "nodes": {},
                "sources": {}
            }"#,
        )
        .unwrap();

        let artifacts =
            ProjectArtifacts::load(dir.path(), &Config::default(), CatalogMode::Read, false).unwrap();
        assert_eq!(artifacts.project.name, "shop");
        assert!(artifacts.catalog.is_none());
        assert!(artifacts.resources.is_empty());
    }
}
