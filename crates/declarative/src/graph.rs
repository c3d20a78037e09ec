//! Dependency graph over resource keys
//!
//! Edges point from a dependency to its dependents, so a topological order
//! lists every dependency before anything that needs it.

use crate::error::{Error, Result};
use crate::types::ResourceKey;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ResourceKey, ()>,
    index_map: HashMap<ResourceKey, NodeIndex>,
    /// Declaration order, used to break ties
    insertion_order: Vec<NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index_map.contains_key(key)
    }

    /// Add a node, returning the existing index if already present
    pub fn add_node(&mut self, key: ResourceKey) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(key.clone());
        self.index_map.insert(key, idx);
        self.insertion_order.push(idx);
        idx
    }

    /// Record that `dependent` needs `dependency`. Both must already be
    /// nodes; returns false otherwise.
    pub fn add_dependency(&mut self, dependent: &ResourceKey, dependency: &ResourceKey) -> bool {
        match (self.index_map.get(dependency), self.index_map.get(dependent)) {
            (Some(&from), Some(&to)) => {
                self.graph.update_edge(from, to, ());
                true
            }
            _ => false,
        }
    }

    fn position(&self, idx: NodeIndex) -> usize {
        self.insertion_order
            .iter()
            .position(|&i| i == idx)
            .unwrap_or(usize::MAX)
    }

    /// Topological order, preferring declaration order among ready nodes.
    ///
    /// Fails with `DependencyCycle` naming the members of a cycle.
    pub fn toposort(&self) -> Result<Vec<ResourceKey>> {
        let total = self.graph.node_count();
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let n = self.graph.neighbors_directed(idx, Direction::Incoming).count();
                (idx, n)
            })
            .collect();

        // ready nodes keyed by declaration position
        let mut ready: BTreeSet<usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .filter(|(_, idx)| in_degree.get(idx).copied().unwrap_or(0) == 0)
            .map(|(pos, _)| pos)
            .collect();

        let mut order = Vec::with_capacity(total);
        while let Some(pos) = ready.pop_first() {
            let Some(&idx) = self.insertion_order.get(pos) else {
                continue;
            };
            if let Some(key) = self.graph.node_weight(idx) {
                order.push(key.clone());
            }
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.insert(self.position(next));
                    }
                }
            }
        }

        if order.len() != total {
            return Err(Error::DependencyCycle {
                cycle: self.find_cycle(),
            });
        }
        Ok(order)
    }

    /// Members of the first cycle in declaration order, closed by repeating
    /// the first member
    fn find_cycle(&self) -> Vec<String> {
        let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .collect();
        for scc in &mut components {
            scc.sort_by_key(|&idx| self.position(idx));
        }
        components.sort_by_key(|scc| scc.first().map_or(usize::MAX, |&idx| self.position(idx)));

        let Some(members) = components.into_iter().next() else {
            return Vec::new();
        };
        let mut cycle: Vec<String> = members
            .iter()
            .filter_map(|&idx| self.graph.node_weight(idx))
            .map(ToString::to_string)
            .collect();
        if let Some(first) = cycle.first().cloned() {
            cycle.push(first);
        }
        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("pipeline", name)
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(key(n));
        }
        for (dependent, dependency) in edges {
            assert!(g.add_dependency(&key(dependent), &key(dependency)));
        }
        g
    }

    fn names(order: &[ResourceKey]) -> Vec<&str> {
        order.iter().map(|k| k.name.as_str()).collect()
    }

    #[test]
    fn test_empty() {
        assert!(DependencyGraph::new().toposort().unwrap().is_empty());
    }

    #[test]
    fn test_keeps_declaration_order_without_edges() {
        let g = graph(&["c", "a", "b"], &[]);
        assert_eq!(names(&g.toposort().unwrap()), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        // downstream declared before upstream
        let g = graph(&["down", "other", "up"], &[("down", "up")]);
        assert_eq!(names(&g.toposort().unwrap()), vec!["other", "up", "down"]);
    }

    #[test]
    fn test_diamond() {
        let g = graph(
            &["d", "b", "c", "a"],
            &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")],
        );
        assert_eq!(names(&g.toposort().unwrap()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_names_members() {
        let g = graph(
            &["free", "a", "b", "c"],
            &[("a", "c"), ("b", "a"), ("c", "b")],
        );
        let err = g.toposort().unwrap_err();
        assert_eq!(
            err,
            Error::DependencyCycle {
                cycle: vec![
                    "pipeline.a".into(),
                    "pipeline.b".into(),
                    "pipeline.c".into(),
                    "pipeline.a".into()
                ]
            }
        );
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let mut g = graph(&["a"], &[]);
        assert!(!g.add_dependency(&key("a"), &key("missing")));
        assert_eq!(g.node_count(), 1);
        assert!(g.contains(&key("a")));
    }
}
