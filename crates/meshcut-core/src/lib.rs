//! Meshcut Core
//!
//! Stable domain types shared by every meshcut crate.
//! Change records and report fields are part of the public API - never rename them.

pub mod change;
pub mod config;
pub mod group;
pub mod report;
pub mod resource;

pub use change::{Change, ChangeSet, EntityType, Operation};
pub use config::{Config, ConfigError};
pub use group::{Group, GroupOwner};
pub use report::{Report, ReportSummary, ReportVersion};
pub use resource::{
    AccessLevel, ObservedColumn, Resource, ResourceKind, ResourceTable, UniqueId, VersionDescriptor,
};
