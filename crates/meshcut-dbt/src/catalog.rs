//! dbt catalog.json parsing
//!
//! The catalog holds the column names and warehouse types observed for each
//! built relation. Contract stamping reads them through [`CatalogLookup`].

use meshcut_core::ObservedColumn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Source of observed column types for a resource
pub trait CatalogLookup {
    /// Observed columns in warehouse order, or `None` if the resource was never built
    fn observed_columns(&self, unique_id: &str) -> Option<Vec<ObservedColumn>>;
}

/// catalog.json structure (subset of fields we care about)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub nodes: HashMap<String, CatalogTable>,

    #[serde(default)]
    pub sources: HashMap<String, CatalogTable>,
}

/// One relation in the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogTable {
    #[serde(default)]
    pub unique_id: Option<String>,

    /// Column name -> column info (JSON object order is not meaningful)
    #[serde(default)]
    pub columns: HashMap<String, CatalogColumn>,
}

/// Column as reported by the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,

    #[serde(rename = "type")]
    pub data_type: String,

    /// Ordinal position in the relation
    #[serde(default)]
    pub index: u32,
}

impl Catalog {
    /// Load catalog from file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse catalog from JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::ParseError(e.to_string()))
    }

    fn table(&self, unique_id: &str) -> Option<&CatalogTable> {
        self.nodes.get(unique_id).or_else(|| self.sources.get(unique_id))
    }
}

impl CatalogLookup for Catalog {
    fn observed_columns(&self, unique_id: &str) -> Option<Vec<ObservedColumn>> {
        let table = self.table(unique_id)?;

        let mut columns: Vec<&CatalogColumn> = table.columns.values().collect();
        columns.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));

        Some(
            columns
                .into_iter()
                .map(|c| ObservedColumn::new(&c.name, &c.data_type))
                .collect(),
        )
    }
}

/// In-memory lookup, mostly for tests and callers that already hold the types
impl CatalogLookup for BTreeMap<String, Vec<ObservedColumn>> {
    fn observed_columns(&self, unique_id: &str) -> Option<Vec<ObservedColumn>> {
        self.get(unique_id).cloned()
    }
}

/// Catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog not found at {0}. Generate one with 'dbt docs generate' or drop --read-catalog")]
    NotFound(String),

    #[error("Failed to read catalog file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse catalog JSON: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "nodes": {
            "model.shop.orders": {
                "unique_id": "model.shop.orders",
                "columns": {
                    "AMOUNT": { "name": "AMOUNT", "type": "NUMERIC", "index": 2 },
                    "ID": { "name": "ID", "type": "INTEGER", "index": 1 },
                    "STATUS": { "name": "STATUS", "type": "TEXT", "index": 3 }
                }
            }
        },
        "sources": {
            "source.shop.raw.orders": {
                "columns": { "id": { "name": "id", "type": "int", "index": 1 } }
            }
        }
    }"#;

    #[test]
    fn columns_follow_warehouse_order() {
        let catalog = Catalog::from_str(CATALOG).unwrap();
        let columns = catalog.observed_columns("model.shop.orders").unwrap();

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "AMOUNT", "STATUS"]);
        assert_eq!(columns[1].data_type, "NUMERIC");
    }

    #[test]
    fn sources_are_looked_up_too() {
        let catalog = Catalog::from_str(CATALOG).unwrap();
        assert_eq!(catalog.observed_columns("source.shop.raw.orders").unwrap().len(), 1);
        assert!(catalog.observed_columns("model.shop.missing").is_none());
    }

    #[test]
    fn missing_catalog_file() {
        let err = Catalog::from_file(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }
}
