//! YAML declaration documents
//!
//! This crate handles:
//! - The in-memory form of a dbt properties file (`StructuredDocument`)
//! - Canonical key ordering so generated files stay minimal and diff-stable
//! - Entry-level merges: contracts, versions, groups and access, splitting

pub mod canonical;
pub mod document;
pub mod merge;

pub use canonical::{canonical_order, canonicalize};
pub use document::{DocumentError, StructuredDocument};
pub use merge::{DocumentMerger, VersionBump};
