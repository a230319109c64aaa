//! Selection expressions
//!
//! A small subset of dbt's node selection syntax:
//! - `orders` / `model.shop.orders` - a resource by name or unique id
//! - `+orders` - with all ancestors
//! - `orders+` - with all descendants
//! - `path:models/marts` - every resource whose code or declaration path starts with the prefix
//!
//! Terms are separated by whitespace and unioned.

use crate::dag::DependencyGraph;
use meshcut_core::{ResourceKind, ResourceTable};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Node {
        name: String,
        ancestors: bool,
        descendants: bool,
    },
    Path(String),
}

/// Parsed selection expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    terms: Vec<Term>,
}

impl Selector {
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        let terms = expression
            .split_whitespace()
            .map(Self::parse_term)
            .collect::<Result<Vec<_>, _>>()?;

        if terms.is_empty() {
            return Err(SelectorError::Empty);
        }

        Ok(Self { terms })
    }

    fn parse_term(raw: &str) -> Result<Term, SelectorError> {
        if let Some(prefix) = raw.strip_prefix("path:") {
            if prefix.is_empty() {
                return Err(SelectorError::InvalidTerm(raw.to_string()));
            }
            return Ok(Term::Path(prefix.trim_end_matches('/').to_string()));
        }

        let (ancestors, rest) = match raw.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (descendants, name) = match rest.strip_suffix('+') {
            Some(name) => (true, name),
            None => (false, rest),
        };

        if name.is_empty() || name.contains('+') {
            return Err(SelectorError::InvalidTerm(raw.to_string()));
        }

        Ok(Term::Node {
            name: name.to_string(),
            ancestors,
            descendants,
        })
    }

    /// Resolve to a set of unique ids
    ///
    /// Tests whose dependencies are all selected are pulled in as well, the
    /// way dbt's eager indirect selection does.
    pub fn select(
        &self,
        resources: &ResourceTable,
        graph: &DependencyGraph,
    ) -> Result<BTreeSet<String>, SelectorError> {
        let mut selected = BTreeSet::new();

        for term in &self.terms {
            match term {
                Term::Node {
                    name,
                    ancestors,
                    descendants,
                } => {
                    let roots: Vec<String> = if resources.contains(name) {
                        vec![name.clone()]
                    } else {
                        resources
                            .find_by_name(name)
                            .filter(|r| r.kind != ResourceKind::Test)
                            .map(|r| r.unique_id.clone())
                            .collect()
                    };

                    if roots.is_empty() {
                        return Err(SelectorError::NoMatch(name.clone()));
                    }

                    for root in roots {
                        if *ancestors {
                            selected.extend(graph.upstream(&root));
                        }
                        if *descendants {
                            selected.extend(graph.downstream(&root));
                        }
                        selected.insert(root);
                    }
                }
                Term::Path(prefix) => {
                    let prefix = Path::new(prefix);
                    let before = selected.len();
                    for resource in resources.iter() {
                        let matches = [&resource.code_path, &resource.declaration_path]
                            .into_iter()
                            .flatten()
                            .any(|path| path.starts_with(prefix));
                        if matches {
                            selected.insert(resource.unique_id.clone());
                        }
                    }
                    if selected.len() == before {
                        return Err(SelectorError::NoMatch(format!("path:{}", prefix.display())));
                    }
                }
            }
        }

        // Only keep ids the resource table knows about (parent_map can list disabled nodes)
        selected.retain(|id| resources.contains(id));

        let tests: Vec<String> = resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Test && !selected.contains(&r.unique_id))
            .filter(|r| !r.depends_on.is_empty() && r.depends_on.iter().all(|d| selected.contains(d)))
            .map(|r| r.unique_id.clone())
            .collect();
        selected.extend(tests);

        Ok(selected)
    }
}

/// Resolve `--select` minus `--exclude`
pub fn resolve_selection(
    select: &str,
    exclude: Option<&str>,
    resources: &ResourceTable,
    graph: &DependencyGraph,
) -> Result<BTreeSet<String>, SelectorError> {
    let mut selected = Selector::parse(select)?.select(resources, graph)?;

    if let Some(exclude) = exclude {
        let excluded = Selector::parse(exclude)?.select(resources, graph)?;
        selected.retain(|id| !excluded.contains(id));
    }

    Ok(selected)
}

/// Selection errors
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("Selection expression is empty")]
    Empty,

    #[error("Invalid selection term '{0}'")]
    InvalidTerm(String),

    #[error("Selection term '{0}' does not match any resource")]
    NoMatch(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcut_core::Resource;

    fn shop() -> (ResourceTable, DependencyGraph) {
        let resources: ResourceTable = [
            Resource::new("model.shop.stg_orders", ResourceKind::Model)
                .with_code_path("models/staging/stg_orders.sql"),
            Resource::new("model.shop.orders", ResourceKind::Model)
                .with_code_path("models/marts/orders.sql")
                .with_depends_on(vec!["model.shop.stg_orders".to_string()]),
            Resource::new("model.shop.customers", ResourceKind::Model)
                .with_code_path("models/marts/customers.sql")
                .with_depends_on(vec!["model.shop.orders".to_string()]),
            Resource::new("test.shop.not_null_orders_id.abc", ResourceKind::Test)
                .with_depends_on(vec!["model.shop.orders".to_string()]),
            Resource::new("test.shop.relationships_customers.def", ResourceKind::Test)
                .with_depends_on(vec![
                    "model.shop.orders".to_string(),
                    "model.shop.customers".to_string(),
                ]),
        ]
        .into_iter()
        .collect();
        let graph = DependencyGraph::from_resources(&resources);
        (resources, graph)
    }

    #[test]
    fn parse_graph_operators() {
        let selector = Selector::parse("+orders customers+").unwrap();
        assert_eq!(selector.terms.len(), 2);
        assert!(Selector::parse("   ").is_err());
        assert!(Selector::parse("+").is_err());
        assert!(Selector::parse("a+b").is_err());
    }

    #[test]
    fn select_with_ancestors_pulls_in_tests() {
        let (resources, graph) = shop();
        let selected = Selector::parse("+orders").unwrap().select(&resources, &graph).unwrap();

        assert!(selected.contains("model.shop.orders"));
        assert!(selected.contains("model.shop.stg_orders"));
        assert!(selected.contains("test.shop.not_null_orders_id.abc"));
        assert!(!selected.contains("model.shop.customers"));
        assert!(!selected.contains("test.shop.relationships_customers.def"));
    }

    #[test]
    fn select_by_path_and_exclude() {
        let (resources, graph) = shop();
        let selected =
            resolve_selection("path:models/marts", Some("customers"), &resources, &graph).unwrap();

        assert!(selected.contains("model.shop.orders"));
        assert!(!selected.contains("model.shop.customers"));
    }

    #[test]
    fn unknown_name_is_an_error() {
        let (resources, graph) = shop();
        let err = Selector::parse("nope").unwrap().select(&resources, &graph).unwrap_err();
        assert!(matches!(err, SelectorError::NoMatch(_)));
    }
}
