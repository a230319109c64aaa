//! Canonical key order for declaration entries

use serde_yaml::{Mapping, Value};

const MODEL_ORDER: &[&str] = &[
    "name",
    "description",
    "latest_version",
    "access",
    "config",
    "meta",
    "columns",
    "versions",
];

const SOURCE_ORDER: &[&str] = &[
    "name",
    "description",
    "database",
    "schema",
    "loader",
    "meta",
    "tables",
];

const NODE_ORDER: &[&str] = &["name", "description", "config", "meta", "columns"];

const MACRO_ORDER: &[&str] = &["name", "description", "arguments"];

const EXPOSURE_ORDER: &[&str] = &[
    "name",
    "label",
    "type",
    "maturity",
    "url",
    "description",
    "depends_on",
    "owner",
];

const METRIC_ORDER: &[&str] = &["name", "label", "description", "type", "type_params", "filter"];

const GROUP_ORDER: &[&str] = &["name", "owner"];

const SEMANTIC_MODEL_ORDER: &[&str] = &[
    "name",
    "description",
    "model",
    "defaults",
    "entities",
    "dimensions",
    "measures",
];

const VERSION_ORDER: &[&str] = &["v", "defined_in"];

/// Canonical key order for entries of a document section
pub fn canonical_order(section: &str) -> &'static [&'static str] {
    match section {
        "models" => MODEL_ORDER,
        "sources" => SOURCE_ORDER,
        "seeds" | "snapshots" | "analyses" => NODE_ORDER,
        "macros" => MACRO_ORDER,
        "exposures" => EXPOSURE_ORDER,
        "metrics" => METRIC_ORDER,
        "groups" => GROUP_ORDER,
        "semantic_models" => SEMANTIC_MODEL_ORDER,
        "versions" => VERSION_ORDER,
        _ => &["name"],
    }
}

/// A value that carries no information once written
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Mapping(m) => m.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        _ => false,
    }
}

/// Re-key `fields` into canonical order, dropping blank values
///
/// Keys outside `order` keep their relative order after the canonical ones.
pub fn canonicalize(fields: &Mapping, order: &[&str]) -> Mapping {
    let mut out = Mapping::new();

    for key in order {
        if let Some(value) = fields.get(*key) {
            if !is_blank(value) {
                out.insert(Value::from(*key), value.clone());
            }
        }
    }

    for (key, value) in fields {
        let canonical = key.as_str().is_some_and(|k| order.contains(&k));
        if !canonical && !is_blank(value) {
            out.insert(key.clone(), value.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn keys(m: &Mapping) -> Vec<&str> {
        m.keys().filter_map(Value::as_str).collect()
    }

    #[test]
    fn reorders_model_keys() {
        let fields = mapping("columns: [{name: id}]\nname: orders\naccess: public\ndescription: All orders\n");
        let out = canonicalize(&fields, canonical_order("models"));
        assert_eq!(keys(&out), vec!["name", "description", "access", "columns"]);
    }

    #[test]
    fn drops_blank_values() {
        let fields = mapping("name: orders\nconfig: {}\ncolumns: []\nmeta: null\ndescription: ''\n");
        let out = canonicalize(&fields, canonical_order("models"));
        // empty strings are user content and stay
        assert_eq!(keys(&out), vec!["name", "description"]);
    }

    #[test]
    fn unknown_keys_follow_canonical_ones() {
        let fields = mapping("tests: [unique]\nname: orders\ndocs: {show: true}\n");
        let out = canonicalize(&fields, canonical_order("models"));
        assert_eq!(keys(&out), vec!["name", "tests", "docs"]);
    }

    #[test]
    fn canonicalize_is_stable() {
        let fields = mapping("name: orders\nversions: [{v: 1}]\nlatest_version: 1\n");
        let once = canonicalize(&fields, canonical_order("models"));
        let twice = canonicalize(&once, canonical_order("models"));
        assert_eq!(once, twice);
    }
}
