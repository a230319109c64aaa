//! Change records
//!
//! A `Change` is created once, at the moment a mutation is decided, and never
//! edited afterwards. Reporting and dry-run output consume them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::resource::ResourceKind;

/// The type of work being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Update,
    Remove,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// The type of entity a change operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Model,
    Analysis,
    Test,
    Snapshot,
    Operation,
    Seed,
    #[serde(rename = "rpc")]
    RpcCall,
    SqlOperation,
    #[serde(rename = "doc")]
    Documentation,
    Source,
    Macro,
    Exposure,
    Metric,
    Group,
    SemanticModel,
    Project,
    Code,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Analysis => "analysis",
            Self::Test => "test",
            Self::Snapshot => "snapshot",
            Self::Operation => "operation",
            Self::Seed => "seed",
            Self::RpcCall => "rpc",
            Self::SqlOperation => "sql_operation",
            Self::Documentation => "doc",
            Self::Source => "source",
            Self::Macro => "macro",
            Self::Exposure => "exposure",
            Self::Metric => "metric",
            Self::Group => "group",
            Self::SemanticModel => "semantic_model",
            Self::Project => "project",
            Self::Code => "code",
        }
    }

    pub fn pluralize(&self) -> String {
        match self {
            Self::Analysis => "analyses".to_string(),
            other => format!("{}s", other.as_str()),
        }
    }
}

impl From<ResourceKind> for EntityType {
    fn from(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Model => Self::Model,
            ResourceKind::Analysis => Self::Analysis,
            ResourceKind::Test => Self::Test,
            ResourceKind::Snapshot => Self::Snapshot,
            ResourceKind::Seed => Self::Seed,
            ResourceKind::Macro => Self::Macro,
            ResourceKind::Documentation => Self::Documentation,
            ResourceKind::Source => Self::Source,
            ResourceKind::Exposure => Self::Exposure,
            ResourceKind::Metric => Self::Metric,
            ResourceKind::Group => Self::Group,
            ResourceKind::SemanticModel => Self::SemanticModel,
            ResourceKind::Other => Self::Operation,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work performed on a dbt project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub operation: Operation,
    pub entity_type: EntityType,
    pub identifier: String,
    pub path: PathBuf,
    /// Payload describing the new state (entry fragment, file fingerprint, ...)
    pub data: serde_json::Value,
}

impl Change {
    pub fn new(
        operation: Operation,
        entity_type: EntityType,
        identifier: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            operation,
            entity_type,
            identifier: identifier.into(),
            path: path.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Attach `data` as the payload; fails when it has no json form
    pub fn with_serialized<T: Serialize + ?Sized>(self, data: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with_data(serde_json::to_value(data)?))
    }
}

/// Unordered collection of changes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes with the given operation
    pub fn count(&self, operation: Operation) -> usize {
        self.changes.iter().filter(|c| c.operation == operation).count()
    }

    /// Changes touching a given identifier
    pub fn for_identifier<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a Change> + 'a {
        self.changes.iter().filter(move |c| c.identifier == identifier)
    }
}

impl Extend<Change> for ChangeSet {
    fn extend<I: IntoIterator<Item = Change>>(&mut self, iter: I) {
        self.changes.extend(iter);
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_entity_types() {
        assert_eq!(EntityType::Analysis.pluralize(), "analyses");
        assert_eq!(EntityType::Model.pluralize(), "models");
        assert_eq!(EntityType::SemanticModel.pluralize(), "semantic_models");
    }

    #[test]
    fn serialized_payload_without_json_form_fails() {
        let change = Change::new(Operation::Add, EntityType::Group, "group.shop.finance", "groups.yml");

        let mut bad = std::collections::BTreeMap::new();
        bad.insert(vec![1u8, 2], "composite keys are not json");
        assert!(change.clone().with_serialized(&bad).is_err());

        let good = change.with_serialized(&[("name", "finance")]).unwrap();
        assert_eq!(good.data, serde_json::json!([["name", "finance"]]));
    }

    #[test]
    fn change_serialization() {
        let change = Change::new(
            Operation::Add,
            EntityType::Model,
            "model.shop.orders",
            "models/_models.yml",
        )
        .with_data(serde_json::json!({ "name": "orders" }));

        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"operation\":\"add\""));
        assert!(json.contains("\"entity_type\":\"model\""));
        assert!(json.contains("\"name\":\"orders\""));
    }

    #[test]
    fn change_set_counts() {
        let mut changes = ChangeSet::new();
        changes.push(Change::new(Operation::Add, EntityType::Model, "a", "x.yml"));
        changes.push(Change::new(Operation::Remove, EntityType::Model, "a", "y.yml"));
        changes.push(Change::new(Operation::Add, EntityType::Code, "b", "b.sql"));

        assert_eq!(changes.len(), 3);
        assert_eq!(changes.count(Operation::Add), 2);
        assert_eq!(changes.for_identifier("a").count(), 2);
    }
}
