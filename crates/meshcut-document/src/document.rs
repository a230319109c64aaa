//! In-memory form of a dbt properties (yml) file
//!
//! A document is a handful of preamble keys (`version: 2`, ...) followed by
//! resource sections (`models:`, `sources:`, ...). Each section is a list of
//! entries addressed by their `name` field, unique within the section.

use serde_yaml::{Mapping, Value};

/// Top-level keys holding named resource entries
pub const SECTION_KEYS: &[&str] = &[
    "models",
    "sources",
    "seeds",
    "snapshots",
    "analyses",
    "macros",
    "exposures",
    "metrics",
    "groups",
    "semantic_models",
    "saved_queries",
    "unit_tests",
];

/// Properties file schema version dbt expects
const DOCUMENT_VERSION: u64 = 2;

#[derive(Debug, Clone, PartialEq)]
struct Section {
    key: String,
    entries: Vec<Mapping>,
}

/// Ordered, name-addressed view of a declaration document
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredDocument {
    /// Non-section top-level keys, in document order
    preamble: Mapping,

    /// Resource sections, in document order
    sections: Vec<Section>,
}

impl Default for StructuredDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_name(entry: &Mapping) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

impl StructuredDocument {
    /// Empty document carrying only `version: 2`
    pub fn new() -> Self {
        let mut preamble = Mapping::new();
        preamble.insert(Value::from("version"), Value::from(DOCUMENT_VERSION));
        Self {
            preamble,
            sections: Vec::new(),
        }
    }

    /// Parse a yml document
    pub fn from_yaml(yaml: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_yaml::from_str(yaml)
            .map_err(|e| DocumentError::ParseError(e.to_string()))?;

        match value {
            Value::Null => Ok(Self::new()),
            Value::Mapping(mapping) => Self::from_mapping(mapping),
            _ => Err(DocumentError::NotAMapping),
        }
    }

    /// Build from an already-parsed top-level mapping
    pub fn from_mapping(mapping: Mapping) -> Result<Self, DocumentError> {
        let mut preamble = Mapping::new();
        let mut sections = Vec::new();

        for (key, value) in mapping {
            let section_key = key.as_str().filter(|k| SECTION_KEYS.contains(k));
            let Some(section_key) = section_key else {
                preamble.insert(key, value);
                continue;
            };

            let entries = match value {
                Value::Null => Vec::new(),
                Value::Sequence(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::Mapping(entry) => Ok(entry),
                        _ => Err(DocumentError::InvalidSection(section_key.to_string())),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(DocumentError::InvalidSection(section_key.to_string())),
            };

            let mut seen = std::collections::HashSet::new();
            for name in entries.iter().filter_map(entry_name) {
                if !seen.insert(name) {
                    return Err(DocumentError::DuplicateEntry(
                        section_key.to_string(),
                        name.to_string(),
                    ));
                }
            }

            sections.push(Section {
                key: section_key.to_string(),
                entries,
            });
        }

        Ok(Self { preamble, sections })
    }

    /// Top-level mapping as it will be written
    pub fn to_mapping(&self) -> Mapping {
        let mut out = self.preamble.clone();

        for section in self.sections.iter().filter(|s| !s.entries.is_empty()) {
            let entries = section
                .entries
                .iter()
                .cloned()
                .map(Value::Mapping)
                .collect();
            out.insert(Value::from(section.key.as_str()), Value::Sequence(entries));
        }

        out
    }

    /// Serialize to yml
    pub fn to_yaml(&self) -> Result<String, DocumentError> {
        serde_yaml::to_string(&self.to_mapping())
            .map_err(|e| DocumentError::SerializeError(e.to_string()))
    }

    fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key == key)
    }

    fn section_mut(&mut self, key: &str) -> &mut Section {
        let index = match self.sections.iter().position(|s| s.key == key) {
            Some(index) => index,
            None => {
                self.sections.push(Section {
                    key: key.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    /// Section keys that currently hold entries
    pub fn section_keys(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .filter(|s| !s.entries.is_empty())
            .map(|s| s.key.as_str())
    }

    /// Look up an entry by name
    pub fn entry(&self, section: &str, name: &str) -> Option<&Mapping> {
        self.section(section)?
            .entries
            .iter()
            .find(|e| entry_name(e) == Some(name))
    }

    /// Entries of a section, in document order
    pub fn entries(&self, section: &str) -> &[Mapping] {
        self.section(section)
            .map(|s| s.entries.as_slice())
            .unwrap_or_default()
    }

    pub fn entry_names(&self, section: &str) -> Vec<&str> {
        self.entries(section).iter().filter_map(entry_name).collect()
    }

    /// Store an entry, replacing the one with the same name in place or appending
    pub fn set_entry(&mut self, section: &str, entry: Mapping) -> Result<(), DocumentError> {
        let name = entry_name(&entry)
            .ok_or_else(|| DocumentError::UnnamedEntry(section.to_string()))?
            .to_string();

        let section = self.section_mut(section);
        match section
            .entries
            .iter_mut()
            .find(|e| entry_name(e) == Some(name.as_str()))
        {
            Some(existing) => *existing = entry,
            None => section.entries.push(entry),
        }

        Ok(())
    }

    /// Remove an entry, returning it
    pub fn remove_entry(&mut self, section: &str, name: &str) -> Option<Mapping> {
        let section = self.sections.iter_mut().find(|s| s.key == section)?;
        let index = section
            .entries
            .iter()
            .position(|e| entry_name(e) == Some(name))?;
        Some(section.entries.remove(index))
    }

    /// Top-level key outside the resource sections
    pub fn preamble_value(&self, key: &str) -> Option<&Value> {
        self.preamble.get(key)
    }

    /// Total number of entries across all sections
    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    /// A document with no entries has nothing worth keeping on disk
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }
}

/// Document errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Failed to parse yml: {0}")]
    ParseError(String),

    #[error("Failed to serialize yml: {0}")]
    SerializeError(String),

    #[error("Top level of a properties file must be a mapping")]
    NotAMapping,

    #[error("Section '{0}' must be a list of mappings")]
    InvalidSection(String),

    #[error("Section '{0}' declares '{1}' more than once")]
    DuplicateEntry(String, String),

    #[error("Entry in section '{0}' has no name")]
    UnnamedEntry(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"
version: 2
models:
  - name: orders
    description: One row per order
  - name: customers
sources:
  - name: raw
    tables:
      - name: orders
"#;

    #[test]
    fn parse_sections_and_preamble() {
        let doc = StructuredDocument::from_yaml(DOC).unwrap();
        assert_eq!(doc.entry_names("models"), vec!["orders", "customers"]);
        assert_eq!(doc.entry_names("sources"), vec!["raw"]);
        assert_eq!(doc.preamble_value("version"), Some(&Value::from(2)));
        assert_eq!(doc.entry_count(), 3);
    }

    #[test]
    fn empty_input_is_empty_document() {
        let doc = StructuredDocument::from_yaml("").unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.preamble_value("version"), Some(&Value::from(2)));
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let err = StructuredDocument::from_yaml("models:\n  - name: a\n  - name: a\n").unwrap_err();
        assert!(matches!(err, DocumentError::DuplicateEntry(..)));
    }

    #[test]
    fn set_entry_replaces_in_place() {
        let mut doc = StructuredDocument::from_yaml(DOC).unwrap();
        let mut entry = Mapping::new();
        entry.insert("name".into(), "orders".into());
        entry.insert("access".into(), "public".into());
        doc.set_entry("models", entry).unwrap();

        assert_eq!(doc.entry_names("models"), vec!["orders", "customers"]);
        assert_eq!(
            doc.entry("models", "orders").unwrap().get("access"),
            Some(&Value::from("public"))
        );
    }

    #[test]
    fn remove_entry_and_emptiness() {
        let mut doc = StructuredDocument::from_yaml("models:\n  - name: a\n").unwrap();
        assert!(doc.remove_entry("models", "a").is_some());
        assert!(doc.remove_entry("models", "a").is_none());
        assert!(doc.is_empty());
        assert!(!doc.to_yaml().unwrap().contains("models"));
    }

    #[test]
    fn yaml_roundtrip_keeps_order() {
        let doc = StructuredDocument::from_yaml(DOC).unwrap();
        let yaml = doc.to_yaml().unwrap();
        let again = StructuredDocument::from_yaml(&yaml).unwrap();

        assert_eq!(doc, again);
        assert!(yaml.find("orders").unwrap() < yaml.find("customers").unwrap());
    }
}
