//! Entry-level document edits
//!
//! Every edit follows the same path: fetch the entry (or a `{name}` skeleton),
//! change fields, re-key it canonically, store it back in place.

use crate::canonical::{canonical_order, canonicalize};
use crate::document::{DocumentError, StructuredDocument};
use meshcut_core::{AccessLevel, Group, ObservedColumn};
use serde_yaml::{Mapping, Value};

const MODELS: &str = "models";
const SOURCES: &str = "sources";
const GROUPS: &str = "groups";

/// Outcome of appending a version to a model entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBump {
    /// Number of the appended version
    pub version: u32,

    /// `latest_version` before the append, `None` if the model was unversioned
    pub previous_latest: Option<u32>,

    /// `latest_version` after the append
    pub latest_version: u32,

    /// File stem recorded on the descriptor, when given explicitly
    pub defined_in: Option<String>,
}

impl VersionBump {
    /// First version of a previously unversioned model
    pub fn is_first(&self) -> bool {
        self.previous_latest.is_none()
    }

    /// File stem that holds this version's code
    pub fn file_stem(&self, resource_name: &str) -> String {
        match &self.defined_in {
            Some(defined_in) => defined_in.clone(),
            None => versioned_stem(resource_name, self.version),
        }
    }
}

/// Default file stem of a model version (`orders_v2`)
pub fn versioned_stem(resource_name: &str, version: u32) -> String {
    format!("{resource_name}_v{version}")
}

fn skeleton(name: &str) -> Mapping {
    let mut entry = Mapping::new();
    entry.insert(Value::from("name"), Value::from(name));
    entry
}

fn name_of(value: &Value) -> Option<&str> {
    value.get("name").and_then(Value::as_str)
}

fn as_version(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn sequence(entry: &Mapping, key: &str) -> Vec<Value> {
    match entry.get(key) {
        Some(Value::Sequence(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Set a nested key, creating intermediate mappings (and replacing non-mapping ones)
///
/// Existing keys keep their position.
fn set_path(target: &mut Mapping, path: &[&str], value: Value) {
    match path {
        [] => {}
        [key] => {
            target.insert(Value::from(*key), value);
        }
        [key, rest @ ..] => {
            let mut child = match target.get(*key) {
                Some(Value::Mapping(existing)) => existing.clone(),
                _ => Mapping::new(),
            };
            set_path(&mut child, rest, value);
            target.insert(Value::from(*key), Value::Mapping(child));
        }
    }
}

/// Replace the same-named item of `items` or append
fn upsert_named(items: &mut Vec<Value>, item: Value) {
    let name = name_of(&item).map(str::to_string);
    match items
        .iter_mut()
        .find(|existing| name.is_some() && name_of(existing) == name.as_deref())
    {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Merge primitives over [`StructuredDocument`]
pub struct DocumentMerger;

impl DocumentMerger {
    fn edit_entry<T>(
        doc: &mut StructuredDocument,
        section: &str,
        name: &str,
        edit: impl FnOnce(&mut Mapping) -> T,
    ) -> Result<T, DocumentError> {
        let mut entry = doc
            .entry(section, name)
            .cloned()
            .unwrap_or_else(|| skeleton(name));

        let outcome = edit(&mut entry);
        doc.set_entry(section, canonicalize(&entry, canonical_order(section)))?;

        Ok(outcome)
    }

    /// Shallow-merge `patch` into the named entry; patch fields win
    pub fn upsert_entry(
        doc: &mut StructuredDocument,
        section: &str,
        name: &str,
        patch: &Mapping,
    ) -> Result<(), DocumentError> {
        tracing::debug!(section, name, fields = patch.len(), "upserting entry");

        Self::edit_entry(doc, section, name, |entry| {
            for (key, value) in patch {
                entry.insert(key.clone(), value.clone());
            }
            // The entry stays addressable under its own name
            entry.insert(Value::from("name"), Value::from(name));
        })
    }

    /// Attach observed types to a model's columns and enforce its contract
    ///
    /// Declared columns keep their order and are matched case-insensitively.
    /// Observed columns missing from the entry are appended in observation
    /// order. Types and appended names are lower-cased.
    pub fn stamp_contract(
        doc: &mut StructuredDocument,
        name: &str,
        observed: &[ObservedColumn],
    ) -> Result<(), DocumentError> {
        tracing::debug!(model = name, columns = observed.len(), "stamping contract");

        Self::edit_entry(doc, MODELS, name, |entry| {
            let mut columns = sequence(entry, "columns");
            let mut declared: Vec<String> = Vec::new();

            for column in columns.iter_mut() {
                let Some(column_name) = name_of(column).map(str::to_lowercase) else {
                    continue;
                };
                let data_type = observed
                    .iter()
                    .find(|o| o.name.to_lowercase() == column_name)
                    .map(|o| o.data_type.to_lowercase());

                if let (Some(data_type), Value::Mapping(column)) = (data_type, &mut *column) {
                    column.insert(Value::from("data_type"), Value::from(data_type));
                }
                declared.push(column_name);
            }

            for column in observed {
                let column_name = column.name.to_lowercase();
                if declared.contains(&column_name) {
                    continue;
                }

                let mut descriptor = Mapping::new();
                descriptor.insert(Value::from("name"), Value::from(column_name.as_str()));
                descriptor.insert(
                    Value::from("data_type"),
                    Value::from(column.data_type.to_lowercase()),
                );
                columns.push(Value::Mapping(descriptor));
                declared.push(column_name);
            }

            entry.insert(Value::from("columns"), Value::Sequence(columns));
            set_path(entry, &["config", "contract", "enforced"], Value::Bool(true));
        })
    }

    /// Append a version descriptor to a model entry
    ///
    /// The new version is one past the highest of `latest_version` and any
    /// existing descriptor. A prerelease leaves `latest_version` alone unless
    /// the model was unversioned.
    pub fn append_version(
        doc: &mut StructuredDocument,
        name: &str,
        prerelease: bool,
        defined_in: Option<&str>,
    ) -> Result<VersionBump, DocumentError> {
        let bump = Self::edit_entry(doc, MODELS, name, |entry| {
            let mut versions = sequence(entry, "versions");

            let highest = versions
                .iter()
                .filter_map(|v| v.get("v"))
                .filter_map(as_version)
                .max();
            let latest = entry.get("latest_version").and_then(as_version);

            let (version, previous_latest) = if versions.is_empty() {
                (1, None)
            } else {
                let current = latest.or(highest).unwrap_or(0);
                (current.max(highest.unwrap_or(0)) + 1, Some(current))
            };

            let latest_version = match previous_latest {
                Some(current) if prerelease => current,
                _ => version,
            };

            let mut descriptor = Mapping::new();
            descriptor.insert(Value::from("v"), Value::from(version));
            if let Some(defined_in) = defined_in {
                descriptor.insert(Value::from("defined_in"), Value::from(defined_in));
            }
            versions.push(Value::Mapping(canonicalize(
                &descriptor,
                canonical_order("versions"),
            )));

            entry.insert(Value::from("versions"), Value::Sequence(versions));
            entry.insert(Value::from("latest_version"), Value::from(latest_version));

            VersionBump {
                version,
                previous_latest,
                latest_version,
                defined_in: defined_in.map(str::to_string),
            }
        })?;

        tracing::debug!(
            model = name,
            version = bump.version,
            latest = bump.latest_version,
            "appended version"
        );

        Ok(bump)
    }

    /// Set a model's access level and, optionally, its `config.group`
    pub fn stamp_group_and_access(
        doc: &mut StructuredDocument,
        name: &str,
        access: AccessLevel,
        group: Option<&str>,
    ) -> Result<(), DocumentError> {
        Self::edit_entry(doc, MODELS, name, |entry| {
            entry.insert(Value::from("access"), Value::from(access.as_str()));
            if let Some(group) = group {
                set_path(entry, &["config", "group"], Value::from(group));
            }
        })
    }

    /// Insert or update a group definition, merging only the owner fields that are set
    pub fn upsert_group(doc: &mut StructuredDocument, group: &Group) -> Result<(), DocumentError> {
        Self::edit_entry(doc, GROUPS, &group.name, |entry| {
            if let Some(owner_name) = &group.owner.name {
                set_path(entry, &["owner", "name"], Value::from(owner_name.as_str()));
            }
            if let Some(email) = &group.owner.email {
                set_path(entry, &["owner", "email"], Value::from(email.as_str()));
            }
        })
    }

    /// Where an entry sits in `doc`: its index in the section, then its
    /// table index for sources
    pub fn entry_position(
        doc: &StructuredDocument,
        section: &str,
        name: &str,
        source_name: Option<&str>,
    ) -> Option<(usize, usize)> {
        let names = doc.entry_names(section);
        match source_name {
            Some(source_name) if section == SOURCES => {
                let index = names.iter().position(|n| *n == source_name)?;
                let source = doc.entry(SOURCES, source_name)?;
                let table = sequence(source, "tables")
                    .iter()
                    .position(|table| name_of(table) == Some(name))?;
                Some((index, table))
            }
            _ => names.iter().position(|n| *n == name).map(|index| (index, 0)),
        }
    }

    /// Take one entry out of `doc`, leaving the remainder behind
    ///
    /// Sources are addressed by table: `source_name` names the source entry
    /// and `name` the table. The fragment is the source entry holding only
    /// that table; the source entry is dropped once its last table leaves.
    pub fn extract_entry(
        doc: &mut StructuredDocument,
        section: &str,
        name: &str,
        source_name: Option<&str>,
    ) -> Result<Option<Mapping>, DocumentError> {
        let source_name = match source_name {
            Some(source_name) if section == SOURCES => source_name,
            _ => return Ok(doc.remove_entry(section, name)),
        };

        let Some(mut source) = doc.entry(SOURCES, source_name).cloned() else {
            return Ok(None);
        };

        let (taken, kept): (Vec<Value>, Vec<Value>) = sequence(&source, "tables")
            .into_iter()
            .partition(|table| name_of(table) == Some(name));

        if taken.is_empty() {
            return Ok(None);
        }

        let mut fragment = source.clone();
        fragment.insert(Value::from("tables"), Value::Sequence(taken));

        if kept.is_empty() {
            doc.remove_entry(SOURCES, source_name);
        } else {
            source.insert(Value::from("tables"), Value::Sequence(kept));
            doc.set_entry(SOURCES, source)?;
        }

        Ok(Some(canonicalize(&fragment, canonical_order(SOURCES))))
    }

    /// Place an extracted fragment into `doc`
    ///
    /// A source fragment landing next to an existing entry of the same source
    /// merges its tables into that entry.
    pub fn add_entry(
        doc: &mut StructuredDocument,
        section: &str,
        fragment: Mapping,
    ) -> Result<(), DocumentError> {
        let order = canonical_order(section);

        let existing = match fragment.get("name").and_then(Value::as_str) {
            Some(name) if section == SOURCES => doc.entry(SOURCES, name).cloned(),
            _ => None,
        };

        let Some(mut merged) = existing else {
            return doc.set_entry(section, canonicalize(&fragment, order));
        };

        let mut tables = sequence(&merged, "tables");
        for table in sequence(&fragment, "tables") {
            upsert_named(&mut tables, table);
        }

        for (key, value) in &fragment {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged.insert(Value::from("tables"), Value::Sequence(tables));

        doc.set_entry(section, canonicalize(&merged, order))
    }
}
