//! Resource snapshots and identifiers
//!
//! A `Resource` is a read-only snapshot of one declared unit of a dbt project.
//! Edits never touch these snapshots; they are expressed as document edits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Closed set of resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Model,
    Analysis,
    Test,
    Snapshot,
    Seed,
    Macro,
    Documentation,
    Source,
    Exposure,
    Metric,
    Group,
    SemanticModel,
    Other,
}

impl ResourceKind {
    /// Map a dbt `resource_type` string onto a kind
    pub fn from_resource_type(resource_type: &str) -> Self {
        match resource_type {
            "model" => Self::Model,
            "analysis" => Self::Analysis,
            "test" => Self::Test,
            "snapshot" => Self::Snapshot,
            "seed" => Self::Seed,
            "macro" => Self::Macro,
            "doc" => Self::Documentation,
            "source" => Self::Source,
            "exposure" => Self::Exposure,
            "metric" => Self::Metric,
            "group" => Self::Group,
            "semantic_model" => Self::SemanticModel,
            _ => Self::Other,
        }
    }

    /// The dbt `resource_type` string for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Analysis => "analysis",
            Self::Test => "test",
            Self::Snapshot => "snapshot",
            Self::Seed => "seed",
            Self::Macro => "macro",
            Self::Documentation => "doc",
            Self::Source => "source",
            Self::Exposure => "exposure",
            Self::Metric => "metric",
            Self::Group => "group",
            Self::SemanticModel => "semantic_model",
            Self::Other => "other",
        }
    }

    /// Kinds that can become part of a cross-project interface
    pub fn is_model_like(&self) -> bool {
        matches!(self, Self::Model)
    }

    /// Kinds backed by a code file that moves with the resource
    pub fn is_code_bearing(&self) -> bool {
        matches!(
            self,
            Self::Model | Self::Analysis | Self::Test | Self::Snapshot | Self::Seed
        )
    }

    /// Top-level key of the declaration document section holding this kind
    ///
    /// Tests and docs have no section of their own: generic tests live under
    /// their parent's columns, doc blocks live in markdown files.
    pub fn section(&self) -> Option<&'static str> {
        match self {
            Self::Model => Some("models"),
            Self::Analysis => Some("analyses"),
            Self::Snapshot => Some("snapshots"),
            Self::Seed => Some("seeds"),
            Self::Macro => Some("macros"),
            Self::Source => Some("sources"),
            Self::Exposure => Some("exposures"),
            Self::Metric => Some("metrics"),
            Self::Group => Some("groups"),
            Self::SemanticModel => Some("semantic_models"),
            Self::Test | Self::Documentation | Self::Other => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visibility of a resource to consumers outside its owning project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Private,
    #[default]
    Protected,
    Public,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Protected => "protected",
            Self::Public => "public",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a model's `versions` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// Version number
    pub v: u32,

    /// File stem defining this version, when it overrides the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defined_in: Option<String>,
}

/// A column as observed in the warehouse (catalog), in observation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedColumn {
    pub name: String,
    pub data_type: String,
}

impl ObservedColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// View over a dot-separated dbt unique id (e.g. `model.shop.orders`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueId<'a> {
    raw: &'a str,
}

impl<'a> UniqueId<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    /// Leading segment (`model`, `test`, `source`, ...)
    pub fn kind_segment(&self) -> &'a str {
        self.raw.split('.').next().unwrap_or_default()
    }

    /// Second segment: the owning package
    pub fn project_segment(&self) -> Option<&'a str> {
        self.raw.split('.').nth(1)
    }

    pub fn segment_count(&self) -> usize {
        self.raw.split('.').count()
    }

    /// Generic tests are identified by four segments:
    /// `test.<project>.<test_name>.<hash>`
    pub fn is_generic_test(&self) -> bool {
        self.kind_segment() == "test" && self.segment_count() == 4
    }
}

/// Read-only snapshot of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique identifier (e.g. "model.shop.orders")
    pub unique_id: String,

    /// Short name (e.g. "orders")
    pub name: String,

    pub kind: ResourceKind,

    /// Owning project (dbt package name)
    pub project: String,

    /// Code file relative to the project root
    #[serde(default)]
    pub code_path: Option<PathBuf>,

    /// Declaration document relative to the project root
    #[serde(default)]
    pub declaration_path: Option<PathBuf>,

    /// Unique ids of the nodes this resource depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Unique ids of the macros this resource calls
    #[serde(default)]
    pub macro_dependencies: Vec<String>,

    #[serde(default)]
    pub access: AccessLevel,

    #[serde(default)]
    pub contract_enforced: bool,

    #[serde(default)]
    pub latest_version: Option<u32>,

    #[serde(default)]
    pub versions: Vec<VersionDescriptor>,

    /// Code language, which doubles as the code file extension
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub raw_code: String,

    /// Parent source entry for source tables
    #[serde(default)]
    pub source_name: Option<String>,

    /// Resource a test is attached to
    #[serde(default)]
    pub attached_node: Option<String>,

    #[serde(default)]
    pub group: Option<String>,
}

impl Resource {
    /// Create a snapshot, deriving name and project from the unique id
    pub fn new(unique_id: impl Into<String>, kind: ResourceKind) -> Self {
        let unique_id = unique_id.into();
        let id = UniqueId::new(&unique_id);
        let project = id.project_segment().unwrap_or_default().to_string();
        let name = unique_id.rsplit('.').next().unwrap_or_default().to_string();

        Self {
            name,
            kind,
            project,
            code_path: None,
            declaration_path: None,
            depends_on: Vec::new(),
            macro_dependencies: Vec::new(),
            access: AccessLevel::default(),
            contract_enforced: false,
            latest_version: None,
            versions: Vec::new(),
            language: None,
            raw_code: String::new(),
            source_name: None,
            attached_node: None,
            group: None,
            unique_id,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_code_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.code_path = Some(path.into());
        self
    }

    pub fn with_declaration_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.declaration_path = Some(path.into());
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_raw_code(mut self, raw_code: impl Into<String>) -> Self {
        self.raw_code = raw_code.into();
        self
    }

    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn with_attached_node(mut self, attached_node: impl Into<String>) -> Self {
        self.attached_node = Some(attached_node.into());
        self
    }

    pub fn unique_id(&self) -> UniqueId<'_> {
        UniqueId::new(&self.unique_id)
    }

    pub fn is_generic_test(&self) -> bool {
        self.kind == ResourceKind::Test && self.unique_id().is_generic_test()
    }

    /// Extension for files derived from this resource's code file
    pub fn file_extension(&self) -> String {
        self.code_path
            .as_deref()
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
            .or_else(|| self.language.clone())
            .unwrap_or_else(|| "sql".to_string())
    }
}

/// Unique id → snapshot, iterated in id order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTable {
    resources: BTreeMap<String, Resource>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: Resource) {
        self.resources.insert(resource.unique_id.clone(), resource);
    }

    pub fn get(&self, unique_id: &str) -> Option<&Resource> {
        self.resources.get(unique_id)
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.resources.contains_key(unique_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Find resources by short name
    ///
    /// The iterator borrows only the table, not `name`.
    pub fn find_by_name<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Resource> + 'a {
        let name = name.to_string();
        self.resources.values().filter(move |r| r.name == name)
    }
}

impl FromIterator<Resource> for ResourceTable {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut table = Self::new();
        for resource in iter {
            table.insert(resource);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'t>(table: &'t ResourceTable, name: &str) -> Vec<&'t Resource> {
        let owned = name.to_string();
        table.find_by_name(&owned).collect()
    }

    #[test]
    fn find_by_name_outlives_the_name() {
        let table: ResourceTable = [
            Resource::new("model.shop.customers.v1", ResourceKind::Model).with_name("customers"),
            Resource::new("model.shop.customers.v2", ResourceKind::Model).with_name("customers"),
            Resource::new("model.shop.orders", ResourceKind::Model),
        ]
        .into_iter()
        .collect();

        let found: Vec<&str> = lookup(&table, "customers")
            .into_iter()
            .map(|r| r.unique_id.as_str())
            .collect();
        assert_eq!(found, vec!["model.shop.customers.v1", "model.shop.customers.v2"]);
    }

    #[test]
    fn unique_id_segments() {
        let id = UniqueId::new("model.shop.orders");
        assert_eq!(id.kind_segment(), "model");
        assert_eq!(id.project_segment(), Some("shop"));
        assert_eq!(id.segment_count(), 3);
        assert!(!id.is_generic_test());
    }

    #[test]
    fn generic_test_detection() {
        assert!(UniqueId::new("test.shop.not_null_orders_id.5fb22c2a").is_generic_test());
        assert!(!UniqueId::new("test.shop.assert_positive_totals").is_generic_test());
        assert!(!UniqueId::new("source.shop.raw.orders").is_generic_test());
    }

    #[test]
    fn resource_derives_name_and_project() {
        let resource = Resource::new("model.shop.orders", ResourceKind::Model);
        assert_eq!(resource.name, "orders");
        assert_eq!(resource.project, "shop");
        assert_eq!(resource.access, AccessLevel::Protected);
    }

    #[test]
    fn file_extension_prefers_code_path() {
        let python = Resource::new("model.shop.scores", ResourceKind::Model)
            .with_code_path("models/scores.py")
            .with_language("sql");
        assert_eq!(python.file_extension(), "py");

        let bare = Resource::new("model.shop.orders", ResourceKind::Model);
        assert_eq!(bare.file_extension(), "sql");
    }

    #[test]
    fn kind_sections() {
        assert_eq!(ResourceKind::Model.section(), Some("models"));
        assert_eq!(ResourceKind::Analysis.section(), Some("analyses"));
        assert_eq!(ResourceKind::Test.section(), None);
        assert!(ResourceKind::Seed.is_code_bearing());
        assert!(!ResourceKind::Macro.is_code_bearing());
    }
}
