//! Tally Configured Graph
//!
//! Node table for the configured targets of one invocation and the memoized
//! graph-size computation used by `buck2.log_configured_graph_size`.
//!
//! # Core Concepts
//!
//! - [`ConfiguredGraph`]: arena of configured targets and their dependency edges
//! - [`GraphSizeComputer`]: distinct-node count of a target's transitive graph
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tally_artifact::{ConfigurationDescriptor, ConfiguredTargetKey, TargetLabel};
//! use tally_graph::{ConfiguredGraph, GraphSizeComputer};
//!
//! let key = |s: &str| {
//!     ConfiguredTargetKey::new(
//!         TargetLabel::parse(s).unwrap(),
//!         ConfigurationDescriptor::unspecified(),
//!     )
//! };
//! let graph = ConfiguredGraph::new();
//! graph.add_dep(&key("root//:rule1"), &key("root//:dep1")).unwrap();
//!
//! let sizes = GraphSizeComputer::new(Arc::new(graph));
//! assert_eq!(sizes.size_of(&key("root//:rule1")).unwrap(), 2);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod graph;
mod size;

pub use error::GraphError;
pub use graph::ConfiguredGraph;
pub use size::GraphSizeComputer;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;
    use tally_artifact::{ConfigurationDescriptor, ConfiguredTargetKey, TargetLabel};

    fn key(name: &str, cfg: &str) -> ConfiguredTargetKey {
        ConfiguredTargetKey::new(
            TargetLabel::parse(&format!("root//:{name}")).unwrap(),
            ConfigurationDescriptor::named(cfg),
        )
    }

    #[test]
    fn configurations_do_not_share_nodes() {
        let graph = ConfiguredGraph::new();
        graph.add_dep(&key("app", "linux"), &key("lib", "linux")).unwrap();
        graph.add_dep(&key("app", "macos"), &key("lib", "macos")).unwrap();
        graph.add_dep(&key("lib", "macos"), &key("sys", "macos")).unwrap();

        let sizes = GraphSizeComputer::new(Arc::new(graph));
        assert_eq!(sizes.size_of(&key("app", "linux")).unwrap(), 2);
        assert_eq!(sizes.size_of(&key("app", "macos")).unwrap(), 3);
    }

    #[test]
    fn concurrent_callers_agree() {
        let graph = ConfiguredGraph::new();
        for i in 0..32 {
            let top = key(&format!("top{i}"), "c");
            graph.add_dep(&top, &key("shared", "c")).unwrap();
            graph.add_dep(&top, &key(&format!("own{i}"), "c")).unwrap();
        }
        graph.add_dep(&key("shared", "c"), &key("leaf", "c")).unwrap();
        let sizes = GraphSizeComputer::new(Arc::new(graph));

        std::thread::scope(|scope| {
            for i in 0..32 {
                let sizes = &sizes;
                scope.spawn(move || {
                    assert_eq!(sizes.size_of(&key(&format!("top{i}"), "c")).unwrap(), 4);
                });
            }
        });
        // 32 tops + 32 owns + shared + leaf
        assert_eq!(sizes.cached_len(), 66);
    }
}
