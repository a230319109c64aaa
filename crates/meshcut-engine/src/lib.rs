//! Meshcut engine - relocation and boundary logic
//!
//! This crate implements the operations behind every meshcut command:
//! - Interface (graph boundary) resolution
//! - Staged file access with a single flush at the end of a run
//! - Cross-project reference rewriting
//! - Resource relocation for `split` and `connect`
//! - Model versioning, grouping and contract stamping
//! - Subproject configuration projection and dependency linking

pub mod boundary;
pub mod contracts;
pub mod grouper;
pub mod linker;
pub mod projector;
pub mod references;
pub mod relocation;
pub mod storage;
pub mod subproject;
pub mod versioning;

pub use boundary::{BoundaryError, GraphBoundaryResolver, OwnerFilter};
pub use contracts::ContractStamper;
pub use grouper::ResourceGrouper;
pub use linker::DependencyLinker;
pub use projector::{ProjectConfigProjector, ProjectionError};
pub use references::ReferenceRewriter;
pub use relocation::{RelocationError, RelocationOutcome, ResourceRelocationOrchestrator};
pub use storage::{FileManager, StorageError, Workspace};
pub use subproject::{SubprojectBuilder, SubprojectError};
pub use versioning::ModelVersioner;
