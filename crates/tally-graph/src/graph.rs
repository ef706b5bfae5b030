//! Configured dependency graph
//!
//! Arena-style node table: each [`ConfiguredTargetKey`] is interned once and
//! addressed by a petgraph `NodeIndex` afterwards. Edges point from a target
//! to its dependencies.

use crate::error::GraphError;
use parking_lot::{RwLock, RwLockReadGuard};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use tally_artifact::ConfiguredTargetKey;

#[derive(Debug, Default)]
pub(crate) struct GraphInner {
    graph: DiGraph<ConfiguredTargetKey, ()>,
    index: HashMap<ConfiguredTargetKey, NodeIndex>,
}

impl GraphInner {
    pub(crate) fn index_of(&self, key: &ConfiguredTargetKey) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    pub(crate) fn key_of(&self, node: NodeIndex) -> &ConfiguredTargetKey {
        &self.graph[node]
    }

    pub(crate) fn deps(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    fn intern(&mut self, key: &ConfiguredTargetKey) -> NodeIndex {
        if let Some(node) = self.index.get(key) {
            return *node;
        }
        let node = self.graph.add_node(key.clone());
        self.index.insert(key.clone(), node);
        node
    }
}

/// The configured target graph of one invocation
///
/// Safe to populate from several configuration workers at once.
#[derive(Debug, Default)]
pub struct ConfiguredGraph {
    inner: RwLock<GraphInner>,
}

impl ConfiguredGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configured target (no-op if already present)
    pub fn add_node(&self, key: &ConfiguredTargetKey) {
        self.inner.write().intern(key);
    }

    /// Record that `from` depends on `to`
    ///
    /// Duplicate edges are ignored. Cycles are not checked here; see
    /// [`ConfiguredGraph::validate`].
    pub fn add_dep(
        &self,
        from: &ConfiguredTargetKey,
        to: &ConfiguredTargetKey,
    ) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfDependency(from.to_string()));
        }

        let mut inner = self.inner.write();
        let a = inner.intern(from);
        let b = inner.intern(to);
        if inner.graph.find_edge(a, b).is_none() {
            inner.graph.add_edge(a, b, ());
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().graph.edge_count()
    }

    pub fn contains(&self, key: &ConfiguredTargetKey) -> bool {
        self.inner.read().index.contains_key(key)
    }

    /// Direct dependencies of a target, if it is known
    pub fn deps_of(&self, key: &ConfiguredTargetKey) -> Option<Vec<ConfiguredTargetKey>> {
        let inner = self.inner.read();
        let node = inner.index_of(key)?;
        let mut deps: Vec<_> = inner.deps(node).map(|d| inner.key_of(d).clone()).collect();
        deps.sort();
        Some(deps)
    }

    /// Check the whole graph is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        let inner = self.inner.read();
        match toposort(&inner.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(GraphError::CycleDetected {
                path: vec![inner.key_of(cycle.node_id()).to_string()],
            }),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read()
    }
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

    #[test]
    fn add_dep_interns_nodes_once() {
        let graph = ConfiguredGraph::new();
        graph.add_dep(&key("a"), &key("b")).unwrap();
        graph.add_dep(&key("a"), &key("c")).unwrap();
        graph.add_dep(&key("a"), &key("b")).unwrap();
        graph.add_node(&key("a"));

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.deps_of(&key("a")).unwrap(), vec![key("b"), key("c")]);
        assert!(graph.deps_of(&key("zzz")).is_none());
    }

    #[test]
    fn self_dependency_is_rejected() {
        let graph = ConfiguredGraph::new();
        assert!(matches!(
            graph.add_dep(&key("a"), &key("a")),
            Err(GraphError::SelfDependency(_))
        ));
    }

    #[test]
    fn validate_finds_cycle() {
        let graph = ConfiguredGraph::new();
        graph.add_dep(&key("a"), &key("b")).unwrap();
        graph.add_dep(&key("b"), &key("c")).unwrap();
        assert!(graph.validate().is_ok());

        graph.add_dep(&key("c"), &key("a")).unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::CycleDetected { .. })));
    }

    #[test]
    fn same_label_different_configuration_are_distinct() {
        let graph = ConfiguredGraph::new();
        let label = TargetLabel::parse("root//:a").unwrap();
        graph.add_node(&ConfiguredTargetKey::new(
            label.clone(),
            ConfigurationDescriptor::named("linux"),
        ));
        graph.add_node(&ConfiguredTargetKey::new(
            label,
            ConfigurationDescriptor::named("macos"),
        ));
        assert_eq!(graph.node_count(), 2);
    }
}
