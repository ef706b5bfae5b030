//! Configured graph size
//!
//! The size of a configured target is the number of distinct nodes reachable
//! from it, itself included. Reachable sets are memoized per node, so targets
//! sharing a subgraph only walk it once per invocation.

use crate::error::GraphError;
use crate::graph::{ConfiguredGraph, GraphInner};
use dashmap::DashMap;
use petgraph::graph::NodeIndex;
use std::collections::HashSet;
use std::sync::Arc;
use tally_artifact::ConfiguredTargetKey;

type NodeSet = HashSet<NodeIndex>;

enum Visit {
    Enter(NodeIndex),
    Exit(NodeIndex),
}

/// Memoizing graph-size calculator scoped to one invocation
///
/// Concurrent callers may race to fill the same memo entry; the first
/// insertion wins and the duplicate work is discarded.
#[derive(Debug)]
pub struct GraphSizeComputer {
    graph: Arc<ConfiguredGraph>,
    memo: DashMap<NodeIndex, Arc<NodeSet>>,
}

impl GraphSizeComputer {
    pub fn new(graph: Arc<ConfiguredGraph>) -> Self {
        Self {
            graph,
            memo: DashMap::new(),
        }
    }

    /// The graph this computer walks
    pub fn graph(&self) -> &Arc<ConfiguredGraph> {
        &self.graph
    }

    /// Node count of the transitive configured graph rooted at `key`
    ///
    /// # Errors
    /// `UnknownTarget` if `key` was never added to the graph, `CycleDetected`
    /// if the walk runs into a dependency cycle.
    pub fn size_of(&self, key: &ConfiguredTargetKey) -> Result<u64, GraphError> {
        let graph = self.graph.read();
        let root = graph
            .index_of(key)
            .ok_or_else(|| GraphError::UnknownTarget(key.to_string()))?;
        let reachable = self.reachable(&graph, root)?;
        tracing::trace!(key = %key, size = reachable.len(), "computed configured graph size");
        Ok(reachable.len() as u64)
    }

    /// Number of nodes whose reachable set is cached
    pub fn cached_len(&self) -> usize {
        self.memo.len()
    }

    fn reachable(&self, graph: &GraphInner, root: NodeIndex) -> Result<Arc<NodeSet>, GraphError> {
        if let Some(hit) = self.memo.get(&root) {
            return Ok(Arc::clone(hit.value()));
        }

        // Iterative post-order walk; `path` mirrors the recursion stack.
        let mut stack = vec![Visit::Enter(root)];
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut on_path = NodeSet::new();

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(node) => {
                    if self.memo.contains_key(&node) {
                        continue;
                    }
                    if !on_path.insert(node) {
                        return Err(cycle_error(graph, &path, node));
                    }
                    path.push(node);
                    stack.push(Visit::Exit(node));
                    stack.extend(graph.deps(node).map(Visit::Enter));
                }
                Visit::Exit(node) => {
                    let mut set = NodeSet::new();
                    set.insert(node);
                    for dep in graph.deps(node) {
                        if let Some(dep_set) = self.memo.get(&dep) {
                            set.extend(dep_set.iter().copied());
                        }
                    }
                    self.memo.entry(node).or_insert_with(|| Arc::new(set));
                    path.pop();
                    on_path.remove(&node);
                }
            }
        }

        self.memo
            .get(&root)
            .map(|set| Arc::clone(set.value()))
            .ok_or_else(|| GraphError::UnknownTarget(graph.key_of(root).to_string()))
    }
}

fn cycle_error(graph: &GraphInner, path: &[NodeIndex], repeated: NodeIndex) -> GraphError {
    let start = path.iter().position(|n| *n == repeated).unwrap_or(0);
    let mut cycle: Vec<String> = path[start..]
        .iter()
        .map(|n| graph.key_of(*n).to_string())
        .collect();
    cycle.push(graph.key_of(repeated).to_string());
    tracing::error!(cycle = ?cycle, "dependency cycle in configured graph");
    GraphError::CycleDetected { path: cycle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_artifact::{ConfigurationDescriptor, TargetLabel};

    fn key(name: &str) -> ConfiguredTargetKey {
        ConfiguredTargetKey::new(
            TargetLabel::parse(&format!("root//:{name}")).unwrap(),
            ConfigurationDescriptor::Unspecified,
        )
    }

    fn computer(edges: &[(&str, &str)]) -> GraphSizeComputer {
        let graph = ConfiguredGraph::new();
        for (from, to) in edges {
            graph.add_dep(&key(from), &key(to)).unwrap();
        }
        GraphSizeComputer::new(Arc::new(graph))
    }

    #[test]
    fn leaf_has_size_one() {
        let graph = ConfiguredGraph::new();
        graph.add_node(&key("leaf"));
        let sizes = GraphSizeComputer::new(Arc::new(graph));
        assert_eq!(sizes.size_of(&key("leaf")).unwrap(), 1);
    }

    #[test]
    fn one_dependency_gives_two() {
        let sizes = computer(&[("rule1", "dep1")]);
        assert_eq!(sizes.size_of(&key("rule1")).unwrap(), 2);
    }

    #[test]
    fn chain_counts_transitive_deps() {
        let sizes = computer(&[("rule2", "mid"), ("mid", "leaf")]);
        assert_eq!(sizes.size_of(&key("rule2")).unwrap(), 3);
        assert_eq!(sizes.size_of(&key("mid")).unwrap(), 2);
    }

    #[test]
    fn diamond_counts_shared_node_once() {
        let sizes = computer(&[
            ("top", "left"),
            ("top", "right"),
            ("left", "base"),
            ("right", "base"),
        ]);
        assert_eq!(sizes.size_of(&key("top")).unwrap(), 4);
    }

    #[test]
    fn memo_is_reused_across_targets() {
        let sizes = computer(&[("a", "shared"), ("b", "shared"), ("shared", "leaf")]);
        assert_eq!(sizes.size_of(&key("a")).unwrap(), 3);
        let cached = sizes.cached_len();
        assert_eq!(cached, 3);
        assert_eq!(sizes.size_of(&key("b")).unwrap(), 3);
        assert_eq!(sizes.cached_len(), cached + 1);
    }

    #[test]
    fn unknown_target_is_error() {
        let sizes = computer(&[("a", "b")]);
        assert!(matches!(
            sizes.size_of(&key("missing")),
            Err(GraphError::UnknownTarget(_))
        ));
    }

    #[test]
    fn cycle_is_fatal_not_infinite() {
        let sizes = computer(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let err = sizes.size_of(&key("a")).unwrap_err();
        match err {
            GraphError::CycleDetected { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }
}
