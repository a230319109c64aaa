//! Run report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::change::{Change, ChangeSet, Operation};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of changes
    pub total: usize,

    pub added: usize,

    pub updated: usize,

    pub removed: usize,

    /// Number of resources in the selection
    pub resources: usize,

    /// Whether the changes were written to disk
    pub applied: bool,
}

/// Run report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Command that produced the report (`split`, `group`, ...)
    pub command: String,

    pub summary: ReportSummary,

    pub changes: Vec<Change>,
}

impl Report {
    /// Build a report from the changes of one run
    pub fn from_changes(command: impl Into<String>, changes: &ChangeSet, resources: usize, applied: bool) -> Self {
        let summary = ReportSummary {
            total: changes.len(),
            added: changes.count(Operation::Add),
            updated: changes.count(Operation::Update),
            removed: changes.count(Operation::Remove),
            resources,
            applied,
        };

        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.into(),
            summary,
            changes: changes.iter().cloned().collect(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::EntityType;

    #[test]
    fn report_counts_operations() {
        let mut changes = ChangeSet::new();
        changes.push(Change::new(Operation::Add, EntityType::Model, "model.shop.orders", "a.yml"));
        changes.push(Change::new(Operation::Remove, EntityType::Model, "model.shop.orders", "b.yml"));
        changes.push(Change::new(Operation::Update, EntityType::Code, "model.shop.totals", "c.sql"));

        let report = Report::from_changes("split", &changes, 1, false);
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.added, 1);
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.summary.removed, 1);
        assert!(!report.summary.applied);
    }

    #[test]
    fn report_serialization() {
        let report = Report::from_changes("group", &ChangeSet::new(), 0, true);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"changes\""));
        assert!(json.contains("\"group\""));
    }
}
