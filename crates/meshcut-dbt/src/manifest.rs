//! dbt manifest.json parsing
//!
//! Parses dbt-generated manifest.json into the resource table consumed by the
//! relocation engine.

use meshcut_core::{AccessLevel, Resource, ResourceKind, ResourceTable, VersionDescriptor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// dbt manifest.json structure (subset of fields we care about)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata about the manifest
    #[serde(default)]
    pub metadata: ManifestMetadata,

    /// Model, test, seed, snapshot and analysis nodes
    #[serde(default)]
    pub nodes: HashMap<String, ManifestNode>,

    /// Source tables
    #[serde(default)]
    pub sources: HashMap<String, ManifestSource>,

    #[serde(default)]
    pub macros: HashMap<String, ManifestMacro>,

    #[serde(default)]
    pub docs: HashMap<String, ManifestEntity>,

    #[serde(default)]
    pub exposures: HashMap<String, ManifestEntity>,

    #[serde(default)]
    pub metrics: HashMap<String, ManifestEntity>,

    #[serde(default)]
    pub groups: HashMap<String, ManifestEntity>,

    #[serde(default)]
    pub semantic_models: HashMap<String, ManifestEntity>,

    /// Kept so parent_map edges always resolve; never relocated
    #[serde(default)]
    pub saved_queries: HashMap<String, ManifestEntity>,

    #[serde(default)]
    pub unit_tests: HashMap<String, ManifestEntity>,

    /// Parent map (node -> list of parent nodes)
    #[serde(default)]
    pub parent_map: HashMap<String, Vec<String>>,

    /// Child map (node -> list of child nodes)
    #[serde(default)]
    pub child_map: HashMap<String, Vec<String>>,
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse manifest from JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json)
            .map_err(|e| ManifestError::ParseError(e.to_string()))
    }

    /// Get all model nodes (filters out tests, seeds, etc.)
    pub fn models(&self) -> HashMap<String, &ManifestNode> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.resource_type == "model")
            .map(|(id, node)| (id.clone(), node))
            .collect()
    }

    /// Get a specific node by unique_id
    pub fn get_node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes.get(unique_id)
    }

    /// Flatten every manifest entity into resource snapshots
    pub fn resources(&self) -> ResourceTable {
        let mut table = ResourceTable::new();

        // Versioned models share a name across one node per version
        let mut versions: BTreeMap<(&str, &str), Vec<VersionDescriptor>> = BTreeMap::new();
        for node in self.nodes.values().filter(|n| n.resource_type == "model") {
            if let Some(v) = node.version {
                versions
                    .entry((node.package_name.as_str(), node.name.as_str()))
                    .or_default()
                    .push(VersionDescriptor { v, defined_in: None });
            }
        }
        for list in versions.values_mut() {
            list.sort_by_key(|d| d.v);
        }

        for node in self.nodes.values() {
            let mut resource = node.to_resource();
            if let Some(list) = versions.get(&(node.package_name.as_str(), node.name.as_str())) {
                resource.versions = list.clone();
            }
            table.insert(resource);
        }

        for source in self.sources.values() {
            let mut resource = Resource::new(&source.unique_id, ResourceKind::Source)
                .with_name(&source.name)
                .with_source_name(&source.source_name)
                .with_declaration_path(&source.original_file_path);
            resource.project = source.package_name.clone();
            table.insert(resource);
        }

        for macro_ in self.macros.values() {
            let mut resource = Resource::new(&macro_.unique_id, ResourceKind::Macro)
                .with_name(&macro_.name)
                .with_code_path(&macro_.original_file_path);
            resource.project = macro_.package_name.clone();
            resource.declaration_path = macro_.patch_path.as_deref().map(strip_package_prefix);
            resource.macro_dependencies = macro_.depends_on.macros.clone();
            table.insert(resource);
        }

        let entities = [
            (&self.docs, ResourceKind::Documentation),
            (&self.exposures, ResourceKind::Exposure),
            (&self.metrics, ResourceKind::Metric),
            (&self.groups, ResourceKind::Group),
            (&self.semantic_models, ResourceKind::SemanticModel),
            (&self.saved_queries, ResourceKind::Other),
            (&self.unit_tests, ResourceKind::Other),
        ];
        for (entities, kind) in entities {
            for entity in entities.values() {
                let mut resource = Resource::new(&entity.unique_id, kind)
                    .with_name(&entity.name)
                    .with_depends_on(entity.depends_on.nodes.clone());
                resource.project = entity.package_name.clone();
                if kind != ResourceKind::Documentation {
                    resource.declaration_path = Some(PathBuf::from(&entity.original_file_path));
                }
                table.insert(resource);
            }
        }

        table
    }
}

/// Manifest metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub dbt_schema_version: String,
    #[serde(default)]
    pub dbt_version: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub project_name: Option<String>,
}

/// A node in the manifest (model, test, snapshot, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Unique identifier (e.g., "model.my_project.users")
    pub unique_id: String,

    /// Node name (e.g., "users")
    pub name: String,

    /// Resource type (model, test, snapshot, etc.)
    pub resource_type: String,

    /// Package name
    pub package_name: String,

    /// Original file path
    pub original_file_path: String,

    /// Declaration document (`<package>://<path>`)
    #[serde(default)]
    pub patch_path: Option<String>,

    /// Node configuration
    #[serde(default)]
    pub config: NodeConfig,

    #[serde(default)]
    pub access: Option<AccessLevel>,

    #[serde(default)]
    pub group: Option<String>,

    /// Dependencies
    #[serde(default)]
    pub depends_on: DependsOn,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub raw_code: String,

    #[serde(default, deserialize_with = "lenient_version")]
    pub version: Option<u32>,

    #[serde(default, deserialize_with = "lenient_version")]
    pub latest_version: Option<u32>,

    #[serde(default)]
    pub attached_node: Option<String>,
}

impl ManifestNode {
    fn to_resource(&self) -> Resource {
        let kind = ResourceKind::from_resource_type(&self.resource_type);
        let mut resource = Resource::new(&self.unique_id, kind)
            .with_name(&self.name)
            .with_depends_on(self.depends_on.nodes.clone())
            .with_raw_code(&self.raw_code);

        resource.project = self.package_name.clone();
        resource.macro_dependencies = self.depends_on.macros.clone();
        resource.access = self.access.unwrap_or_default();
        resource.contract_enforced = self
            .config
            .contract
            .as_ref()
            .map(|c| c.enforced)
            .unwrap_or(false);
        resource.latest_version = self.latest_version;
        resource.language = self.language.clone();
        resource.attached_node = self.attached_node.clone();
        resource.group = self.group.clone().or_else(|| self.config.group.clone());
        resource.declaration_path = self.patch_path.as_deref().map(strip_package_prefix);

        // Generic tests point original_file_path at the yml that declares them
        if !resource.is_generic_test() {
            resource.code_path = Some(PathBuf::from(&self.original_file_path));
        }

        resource
    }
}

/// Node configuration (from dbt_project.yml or model config)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Materialization type
    #[serde(default)]
    pub materialized: Option<String>,

    /// Contract configuration
    #[serde(default)]
    pub contract: Option<ContractConfig>,

    #[serde(default)]
    pub group: Option<String>,
}

/// Contract configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Whether the contract is enforced
    pub enforced: bool,
}

/// Dependencies structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    /// List of node unique_ids this node depends on
    #[serde(default)]
    pub nodes: Vec<String>,

    /// List of macro unique_ids this node calls
    #[serde(default)]
    pub macros: Vec<String>,
}

/// A source table in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    /// Unique identifier (e.g., "source.my_project.raw.users")
    pub unique_id: String,

    /// Source name (e.g., "raw")
    pub source_name: String,

    /// Table name (e.g., "users")
    pub name: String,

    pub package_name: String,

    /// The yml file declaring the source
    pub original_file_path: String,
}

/// A macro in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMacro {
    pub unique_id: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub patch_path: Option<String>,
    #[serde(default)]
    pub depends_on: DependsOn,
}

/// Exposures, metrics, groups, semantic models and doc blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntity {
    pub unique_id: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub depends_on: DependsOn,
}

/// Strip the `<package>://` prefix dbt puts on patch paths
fn strip_package_prefix(patch_path: &str) -> PathBuf {
    match patch_path.split_once("://") {
        Some((_, path)) => PathBuf::from(path),
        None => PathBuf::from(patch_path),
    }
}

/// dbt writes versions as numbers or strings ("2", 2, 2.0)
fn lenient_version<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .map(|v| v as u32),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Manifest parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),
}
