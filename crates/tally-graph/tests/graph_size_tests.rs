use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tally_artifact::{ConfigurationDescriptor, ConfiguredTargetKey, TargetLabel};
use tally_graph::{ConfiguredGraph, GraphError, GraphSizeComputer};

fn node(i: usize) -> ConfiguredTargetKey {
    ConfiguredTargetKey::new(
        TargetLabel::parse(&format!("root//gen:n{i}")).unwrap(),
        ConfigurationDescriptor::unspecified(),
    )
}

fn naive_size(adj: &HashMap<usize, BTreeSet<usize>>, start: usize) -> u64 {
    let mut seen = BTreeSet::new();
    let mut queue = vec![start];
    while let Some(n) = queue.pop() {
        if seen.insert(n) {
            if let Some(next) = adj.get(&n) {
                queue.extend(next.iter().copied());
            }
        }
    }
    seen.len() as u64
}

proptest! {
    #[test]
    fn prop_size_matches_naive_reachability(
        node_count in 1..24usize,
        edges in proptest::collection::vec((0..24usize, 0..24usize), 0..80)
    ) {
        let graph = ConfiguredGraph::new();
        let mut adj: HashMap<usize, BTreeSet<usize>> = HashMap::new();
        for i in 0..node_count {
            graph.add_node(&node(i));
        }
        // Only forward edges, so the graph stays acyclic.
        for (a, b) in edges {
            let (from, to) = (a.min(b), a.max(b));
            if from == to || to >= node_count {
                continue;
            }
            graph.add_dep(&node(from), &node(to)).unwrap();
            adj.entry(from).or_default().insert(to);
        }
        prop_assert!(graph.validate().is_ok());

        let sizes = GraphSizeComputer::new(Arc::new(graph));
        for i in 0..node_count {
            prop_assert_eq!(sizes.size_of(&node(i)).unwrap(), naive_size(&adj, i));
        }
        prop_assert_eq!(sizes.cached_len(), node_count);
    }

    #[test]
    fn prop_query_order_does_not_matter(
        edges in proptest::collection::vec((0..12usize, 0..12usize), 0..40),
        order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let build = || {
            let graph = ConfiguredGraph::new();
            for i in 0..12 {
                graph.add_node(&node(i));
            }
            for (a, b) in &edges {
                if a < b {
                    graph.add_dep(&node(*a), &node(*b)).unwrap();
                }
            }
            GraphSizeComputer::new(Arc::new(graph))
        };
        let ascending = build();
        let shuffled = build();
        for i in &order {
            prop_assert_eq!(
                shuffled.size_of(&node(*i)).unwrap(),
                ascending.size_of(&node(*i)).unwrap()
            );
        }
    }
}

#[test]
fn fixture_sizes() {
    let graph = ConfiguredGraph::new();
    let key = |s: &str| {
        ConfiguredTargetKey::new(
            TargetLabel::parse(s).unwrap(),
            ConfigurationDescriptor::unspecified(),
        )
    };
    graph.add_dep(&key("root//:rule1"), &key("root//:dep1")).unwrap();
    graph.add_dep(&key("root//:rule2"), &key("root//:mid")).unwrap();
    graph.add_dep(&key("root//:mid"), &key("root//:leaf")).unwrap();

    let sizes = GraphSizeComputer::new(Arc::new(graph));
    assert_eq!(sizes.size_of(&key("root//:rule1")).unwrap(), 2);
    assert_eq!(sizes.size_of(&key("root//:rule2")).unwrap(), 3);
}

#[test]
fn cycle_below_root_is_reported() {
    let graph = ConfiguredGraph::new();
    graph.add_dep(&node(0), &node(1)).unwrap();
    graph.add_dep(&node(1), &node(2)).unwrap();
    graph.add_dep(&node(2), &node(1)).unwrap();

    let sizes = GraphSizeComputer::new(Arc::new(graph));
    match sizes.size_of(&node(0)) {
        Err(GraphError::CycleDetected { path }) => {
            assert_eq!(path.len(), 3);
            assert!(!path.contains(&node(0).to_string()));
        }
        other => panic!("expected cycle, got {other:?}"),
    }
    assert!(matches!(sizes.graph().validate(), Err(GraphError::CycleDetected { .. })));
}
