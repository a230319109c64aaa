//! dbt artifact parsing and DAG construction
//!
//! This crate handles:
//! - Parsing manifest.json into a resource table
//! - Building dependency graphs (DAG)
//! - Reading observed column types from catalog.json
//! - Resolving selection expressions
//! - Discovering dbt projects on disk

pub mod catalog;
pub mod dag;
pub mod manifest;
pub mod project;
pub mod selector;

pub use catalog::{Catalog, CatalogError, CatalogLookup};
pub use dag::{DependencyGraph, NodeId};
pub use manifest::{Manifest, ManifestError, ManifestNode};
pub use project::{DbtProject, ProjectError};
pub use selector::{resolve_selection, Selector, SelectorError};
