//! Connected and strongly connected components against reference
//! implementations.

mod common;

use feldera_gla::{
    operator::{components, scc, ConnectedComponents, StronglyConnectedComponents},
    GraphConfig, Runtime, RuntimeConfig, Termination,
};
use pretty_assertions::assert_eq;
use proptest::{collection::vec, prelude::*};

use common::{init_test_logger, split};

fn labels(output: Vec<(u64, u64)>) -> Vec<u64> {
    output
        .into_iter()
        .enumerate()
        .map(|(index, (vertex, label))| {
            assert_eq!(index as u64, vertex);
            label
        })
        .collect()
}

// Smallest vertex id of every connected component.
fn union_find_labels(num_vertices: usize, edges: &[(u64, u64)]) -> Vec<u64> {
    fn find(parent: &mut [usize], mut v: usize) -> usize {
        while parent[v] != v {
            parent[v] = parent[parent[v]];
            v = parent[v];
        }
        v
    }

    let mut parent: Vec<usize> = (0..num_vertices).collect();
    for (s, t) in edges {
        let (a, b) = (find(&mut parent, *s as usize), find(&mut parent, *t as usize));
        // The smaller root wins, so every root is its component's minimum.
        if a < b {
            parent[b] = a;
        } else {
            parent[a] = b;
        }
    }
    (0..num_vertices)
        .map(|v| find(&mut parent, v) as u64)
        .collect()
}

// Smallest vertex id of every strongly connected component, from the
// transitive closure.
fn closure_labels(num_vertices: usize, edges: &[(u64, u64)]) -> Vec<u64> {
    let mut reach = vec![vec![false; num_vertices]; num_vertices];
    for (v, row) in reach.iter_mut().enumerate() {
        row[v] = true;
    }
    for (s, t) in edges {
        reach[*s as usize][*t as usize] = true;
    }
    for k in 0..num_vertices {
        for i in 0..num_vertices {
            if reach[i][k] {
                for j in 0..num_vertices {
                    if reach[k][j] {
                        reach[i][j] = true;
                    }
                }
            }
        }
    }
    (0..num_vertices)
        .map(|v| {
            (0..num_vertices)
                .find(|u| reach[v][*u] && reach[*u][v])
                .unwrap_or(v) as u64
        })
        .collect()
}

fn graph() -> impl Strategy<Value = (Vec<(u64, u64)>, Vec<usize>)> {
    (2u64..40).prop_flat_map(|n| {
        (
            vec((0..n, 0..n), 1..80),
            vec(0usize..30, 0..4),
        )
    })
}

fn num_vertices(edges: &[(u64, u64)]) -> usize {
    edges.iter().map(|(s, t)| *s.max(t)).max().map_or(0, |max| max as usize + 1)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn components_match_union_find((edges, lengths) in graph(), workers in 1usize..5) {
        let runtime = Runtime::new(RuntimeConfig { workers, chunk_size: 5 }).unwrap();
        let partitions = split(&edges, &lengths);

        let actual = labels(components::run(&runtime, GraphConfig::default(), &partitions).unwrap());
        prop_assert_eq!(actual, union_find_labels(num_vertices(&edges), &edges));
    }

    #[test]
    fn strong_components_match_transitive_closure((edges, lengths) in graph(), workers in 1usize..5) {
        let runtime = Runtime::new(RuntimeConfig { workers, chunk_size: 5 }).unwrap();
        let partitions = split(&edges, &lengths);

        let actual = labels(scc::run(&runtime, GraphConfig::default(), &partitions).unwrap());
        prop_assert_eq!(actual, closure_labels(num_vertices(&edges), &edges));
    }
}

#[test]
fn two_triangles() {
    init_test_logger();

    let runtime = Runtime::with_workers(2).unwrap();
    let partitions = vec![
        vec![(0, 1), (1, 2)],
        vec![(2, 0), (3, 4)],
        vec![(4, 5), (5, 3)],
    ];

    let weak = labels(components::run(&runtime, GraphConfig::default(), &partitions).unwrap());
    assert_eq!(weak, vec![0, 0, 0, 3, 3, 3]);
    let strong = labels(scc::run(&runtime, GraphConfig::default(), &partitions).unwrap());
    assert_eq!(strong, vec![0, 0, 0, 3, 3, 3]);
}

#[test]
fn path_takes_three_rounds_in_one_partition() {
    let runtime = Runtime::with_workers(1).unwrap();
    let partitions = vec![vec![(0, 1), (1, 2)]];

    let ctx = components::context(GraphConfig::default()).unwrap();
    let finished = runtime
        .run_iterable::<ConnectedComponents, _>(ctx, &partitions)
        .unwrap();
    assert_eq!(finished.rounds, 3);
    assert_eq!(finished.termination, Termination::Converged);
    assert_eq!(finished.result(), vec![0, 0, 0]);
}

#[test]
fn directed_chain_is_all_singletons() {
    let runtime = Runtime::with_workers(3).unwrap();
    let edges: Vec<(u64, u64)> = (0..20).map(|v| (v, v + 1)).collect();
    let partitions = split(&edges, &[5, 5, 5]);

    let ctx = scc::context(GraphConfig::default()).unwrap();
    let finished = runtime
        .run_iterable::<StronglyConnectedComponents, _>(ctx, &partitions)
        .unwrap();
    assert!(finished.converged());
    assert_eq!(finished.result(), (0..=20).collect::<Vec<u64>>());
}

#[test]
fn round_cap_keeps_last_labels() {
    let runtime = Runtime::with_workers(1).unwrap();
    // Reversed path: every propagation round moves label 0 one step.
    let edges: Vec<(u64, u64)> = (0..10).rev().map(|v| (v + 1, v)).collect();
    let partitions = vec![edges];

    let ctx = components::context(GraphConfig { max_rounds: 2 }).unwrap();
    let finished = runtime
        .run_iterable::<ConnectedComponents, _>(ctx, &partitions)
        .unwrap();
    assert_eq!(finished.rounds, 2);
    assert_eq!(finished.termination, Termination::RoundCap);

    let labels = finished.result();
    assert_eq!(labels.len(), 11);
    assert!(labels.iter().enumerate().all(|(v, label)| *label <= v as u64));
    assert_ne!(labels, vec![0; 11]);
}
