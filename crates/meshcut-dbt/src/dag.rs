//! Dependency graph (DAG) construction and traversal
//!
//! Builds forward and reverse dependency graphs. An edge `u -> v` means `v`
//! depends on `u`.

use crate::manifest::Manifest;
use meshcut_core::ResourceTable;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Node identifier (unique_id from manifest)
pub type NodeId = String;

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    /// Forward edges: node -> nodes it depends on (parents)
    parents: BTreeMap<NodeId, BTreeSet<NodeId>>,

    /// Reverse edges: node -> nodes that depend on it (children)
    children: BTreeMap<NodeId, BTreeSet<NodeId>>,

    /// All nodes in the graph
    nodes: BTreeSet<NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dependency graph from a manifest
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut graph = Self::new();

        // Use parent_map from manifest if available
        if !manifest.parent_map.is_empty() {
            for (node_id, parent_ids) in &manifest.parent_map {
                graph.add_node(node_id);
                for parent_id in parent_ids {
                    graph.add_edge(parent_id, node_id);
                }
            }
        } else {
            // Build from depends_on if the parent map is not available
            graph = Self::from_resources(&manifest.resources());
        }

        graph
    }

    /// Build a dependency graph from resource snapshots' `depends_on` lists
    pub fn from_resources(resources: &ResourceTable) -> Self {
        let mut graph = Self::new();

        for resource in resources.iter() {
            graph.add_node(&resource.unique_id);
            for dep_id in &resource.depends_on {
                graph.add_edge(dep_id, &resource.unique_id);
            }
        }

        graph
    }

    pub fn add_node(&mut self, node_id: &str) {
        self.nodes.insert(node_id.to_string());
    }

    /// Add edge `parent -> child` (child depends on parent)
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        self.nodes.insert(parent.to_string());
        self.nodes.insert(child.to_string());
        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    /// Get all nodes in the graph
    pub fn all_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains(node_id)
    }

    /// All edges as `(parent, child)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.children
            .iter()
            .flat_map(|(parent, children)| children.iter().map(move |child| (parent, child)))
    }

    pub fn edge_count(&self) -> usize {
        self.children.values().map(BTreeSet::len).sum()
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> Vec<&NodeId> {
        self.parents
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> Vec<&NodeId> {
        self.children
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get all downstream nodes (transitive closure of children)
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::walk(node_id, &self.children)
    }

    /// Get all upstream nodes (transitive closure of parents)
    pub fn upstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::walk(node_id, &self.parents)
    }

    /// BFS over one edge direction, excluding the start node
    fn walk(node_id: &str, edges: &BTreeMap<NodeId, BTreeSet<NodeId>>) -> Vec<NodeId> {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        let mut result = Vec::new();

        if let Some(next) = edges.get(node_id) {
            queue.extend(next.iter());
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current.clone());

            if let Some(next) = edges.get(current) {
                queue.extend(next.iter().filter(|n| !visited.contains(n)));
            }
        }

        result
    }

    /// Get topological sort of all nodes, or `None` if the graph has a cycle
    pub fn topological_sort(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: BTreeMap<&NodeId, usize> = self
            .nodes
            .iter()
            .map(|node| (node, self.parents.get(node).map_or(0, BTreeSet::len)))
            .collect();

        let mut queue: VecDeque<&NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        // Kahn's algorithm
        while let Some(node) = queue.pop_front() {
            result.push(node.clone());

            if let Some(children) = self.children.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child);
                        }
                    }
                }
            }
        }

        // Check if all nodes were visited (no cycles)
        if result.len() == self.nodes.len() {
            Some(result)
        } else {
            None
        }
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_sort().is_some()
    }
}
