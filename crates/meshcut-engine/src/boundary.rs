//! Interface resolution
//!
//! The interface of a selection is the set of selected resources that sit on
//! an edge crossing the selection boundary. Once the selection moves to its
//! own project these are the resources consumers reach across projects, so
//! they need public access and an enforced contract.

use meshcut_core::{Resource, ResourceTable};
use meshcut_dbt::DependencyGraph;
use std::collections::BTreeSet;

/// Which boundary candidates are kept
///
/// Only model-like resources owned by the project the selection leaves are
/// physically moving, so only they need to be exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerFilter {
    project: String,
}

impl OwnerFilter {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    pub fn accepts(&self, resource: &Resource) -> bool {
        resource.kind.is_model_like() && resource.project == self.project
    }
}

/// Computes the interface of a selection
pub struct GraphBoundaryResolver;

impl GraphBoundaryResolver {
    /// Single pass over the edges of a frozen graph
    ///
    /// Every edge endpoint must exist in `resources`; an unknown id is fatal.
    pub fn resolve(
        graph: &DependencyGraph,
        selection: &BTreeSet<String>,
        filter: &OwnerFilter,
        resources: &ResourceTable,
    ) -> Result<BTreeSet<String>, BoundaryError> {
        let mut candidates = BTreeSet::new();

        for (parent, child) in graph.edges() {
            for endpoint in [parent, child] {
                if !resources.contains(endpoint) {
                    return Err(BoundaryError::ResourceNotFound(endpoint.clone()));
                }
            }

            match (selection.contains(parent), selection.contains(child)) {
                (true, false) => {
                    candidates.insert(parent);
                }
                (false, true) => {
                    candidates.insert(child);
                }
                _ => {}
            }
        }

        let interface: BTreeSet<String> = candidates
            .into_iter()
            .filter(|id| resources.get(id).is_some_and(|r| filter.accepts(r)))
            .cloned()
            .collect();

        tracing::debug!(
            selected = selection.len(),
            interface = interface.len(),
            "resolved selection boundary"
        );

        Ok(interface)
    }
}

/// Boundary resolution errors
#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    #[error("Resource {0} not found in the project")]
    ResourceNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcut_core::ResourceKind;

    fn shop() -> (ResourceTable, DependencyGraph) {
        let resources: ResourceTable = [
            Resource::new("source.shop.raw.orders", ResourceKind::Source),
            Resource::new("model.shop.stg_orders", ResourceKind::Model)
                .with_depends_on(vec!["source.shop.raw.orders".to_string()]),
            Resource::new("model.shop.orders", ResourceKind::Model)
                .with_depends_on(vec!["model.shop.stg_orders".to_string()]),
            Resource::new("model.shop.customers", ResourceKind::Model)
                .with_depends_on(vec!["model.shop.orders".to_string()]),
            Resource::new("model.vendor.calendar", ResourceKind::Model),
        ]
        .into_iter()
        .collect();
        let graph = DependencyGraph::from_resources(&resources);
        (resources, graph)
    }

    fn selection(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn single_selected_model_is_the_interface() {
        let (resources, graph) = shop();
        let interface = GraphBoundaryResolver::resolve(
            &graph,
            &selection(&["model.shop.orders"]),
            &OwnerFilter::new("shop"),
            &resources,
        )
        .unwrap();

        assert_eq!(interface, selection(&["model.shop.orders"]));
    }

    #[test]
    fn inner_edges_do_not_count() {
        let (resources, graph) = shop();
        let interface = GraphBoundaryResolver::resolve(
            &graph,
            &selection(&["model.shop.stg_orders", "model.shop.orders", "model.shop.customers"]),
            &OwnerFilter::new("shop"),
            &resources,
        )
        .unwrap();

        // stg_orders reads a source left behind
        assert_eq!(interface, selection(&["model.shop.stg_orders"]));
    }

    #[test]
    fn filter_drops_other_kinds_and_projects() {
        let (resources, mut graph) = shop();
        graph.add_edge("model.vendor.calendar", "model.shop.customers");

        let interface = GraphBoundaryResolver::resolve(
            &graph,
            &selection(&["source.shop.raw.orders", "model.vendor.calendar"]),
            &OwnerFilter::new("shop"),
            &resources,
        )
        .unwrap();

        assert!(interface.is_empty());
    }

    #[test]
    fn unknown_edge_endpoint_is_fatal() {
        let (resources, mut graph) = shop();
        graph.add_edge("model.shop.orders", "model.shop.ghost");

        let err = GraphBoundaryResolver::resolve(
            &graph,
            &selection(&["model.shop.orders"]),
            &OwnerFilter::new("shop"),
            &resources,
        )
        .unwrap_err();

        assert!(matches!(err, BoundaryError::ResourceNotFound(id) if id == "model.shop.ghost"));
    }
}
