use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::cluster::{Cluster, Diagnostics, StopReason};
use crate::error::WavegraphError;
use crate::graph::*;
use crate::pixel::{Pixel, PixelKey};
use crate::store::ClusterStore;
use crate::tests::{cluster, meta, template};

fn node(id: &str, shift: usize) -> NodeId {
    NodeId::new(template(id), shift)
}

/// Random clusters over a small grid so that overlaps are common.
fn random_clusters(seed: u64, n_templates: usize, n_shifts: usize) -> Vec<Cluster> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for t in 0..n_templates {
        for shift in 0..n_shifts {
            let mut cells = BTreeMap::new();
            for _ in 0..6 {
                let scale = rng.random_range(4..=6u32);
                let time = rng.random_range(0..(4usize << (6 - scale)));
                let freq = rng.random_range(1..5usize);
                cells.insert((scale, time, freq), rng.random_range(0.5..2.0f64));
            }
            let cells: Vec<(u32, usize, usize, f64)> =
                cells.into_iter().map(|((s, t, f), v)| (s, t, f, v)).collect();
            out.push(cluster(&format!("t{}", t), shift, &cells));
        }
    }
    out
}

/// Reference all-pairs edge derivation.
fn brute_force(clusters: &[Cluster], tol: &AdjacencyTolerance) -> BTreeSet<(NodeId, NodeId, EdgeLabel)> {
    let mut edges = BTreeSet::new();
    for (i, x) in clusters.iter().enumerate() {
        for y in &clusters[i + 1..] {
            let mut label = None;
            for p in x.keys() {
                for q in y.keys() {
                    if p == q {
                        label = Some(EdgeLabel::SharedPixel);
                    } else if pixels_adjacent(&p, &q, tol) && label.is_none() {
                        label = Some(EdgeLabel::AdjacentPixel);
                    }
                }
            }
            if let Some(label) = label {
                let (a, b) = (NodeId::of(x), NodeId::of(y));
                let (a, b) = if a < b { (a, b) } else { (b, a) };
                edges.insert((a, b, label));
            }
        }
    }
    edges
}

#[test]
fn test_shared_pixel_gives_exactly_one_edge() {
    crate::init();
    let a = cluster("bank0", 0, &[(4, 5, 2, 1.0), (5, 3, 1, 0.5)]);
    let b = cluster("bank0", 1, &[(4, 5, 2, 0.7), (6, 7, 7, 0.2)]);
    let mut builder = GraphBuilder::default();
    builder.add_clusters([b, a]);
    let graph = builder.build().unwrap();

    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    let edge = &graph.edges()[0];
    assert_eq!(edge.a(), &node("bank0", 0));
    assert_eq!(edge.b(), &node("bank0", 1));
    assert_eq!(edge.label(), EdgeLabel::SharedPixel, "strongest label wins");
}

#[test]
fn test_edges_are_canonical_and_loop_free() {
    let clusters = random_clusters(7, 4, 3);
    let mut builder = GraphBuilder::default().with_tolerance(AdjacencyTolerance {
        scale: 1,
        time: 1,
        freq: 1,
    });
    builder.add_clusters(clusters);
    let graph = builder.build().unwrap();

    assert!(graph.edge_count() > 0);
    let mut pairs = BTreeSet::new();
    for e in graph.edges() {
        assert!(e.a() < e.b(), "edge {} {} not canonical", e.a(), e.b());
        assert!(pairs.insert((e.a().clone(), e.b().clone())), "duplicate edge");
    }
    for n in graph.nodes() {
        assert!(graph.edge(&n.id, &n.id).is_none());
    }
}

#[test]
fn test_build_is_independent_of_input_order() {
    crate::init();
    let clusters = random_clusters(42, 5, 4);
    let tol = AdjacencyTolerance {
        scale: 1,
        time: 1,
        freq: 0,
    };
    let build = |input: Vec<Cluster>| {
        let mut builder = GraphBuilder::default().with_tolerance(tol);
        builder.add_clusters(input);
        builder.build().unwrap()
    };
    let reference = build(clusters.clone());

    let mut rng = StdRng::seed_from_u64(1234);
    for _ in 0..5 {
        let mut shuffled = clusters.clone();
        shuffled.shuffle(&mut rng);
        let graph = build(shuffled);
        assert_eq!(graph.edge_set(), reference.edge_set());
        let ids: Vec<&NodeId> = graph.nodes().iter().map(|n| &n.id).collect();
        let ref_ids: Vec<&NodeId> = reference.nodes().iter().map(|n| &n.id).collect();
        assert_eq!(ids, ref_ids);
    }
}

#[test]
fn test_index_matches_all_pairs_scan() {
    let clusters = random_clusters(99, 6, 2);
    for tol in [
        AdjacencyTolerance::exact(),
        AdjacencyTolerance {
            scale: 0,
            time: 2,
            freq: 1,
        },
        AdjacencyTolerance {
            scale: 2,
            time: 1,
            freq: 1,
        },
    ] {
        let mut builder = GraphBuilder::default()
            .with_tolerance(tol)
            .with_adjacent_shifts(false);
        builder.add_clusters(clusters.clone());
        let graph = builder.build().unwrap();
        assert_eq!(graph.edge_set(), brute_force(&clusters, &tol), "tolerance {:?}", tol);
    }
}

#[test]
fn test_unbounded_tolerance_stays_indexed() {
    let clusters = random_clusters(3, 4, 2);
    let tol = AdjacencyTolerance {
        scale: u32::MAX,
        time: usize::MAX,
        freq: 1_000_000_000,
    };
    let mut builder = GraphBuilder::default()
        .with_tolerance(tol)
        .with_adjacent_shifts(false);
    builder.add_clusters(clusters.clone());
    let graph = builder.build().unwrap();

    // every pair is within reach, so the graph is complete
    let n = clusters.len();
    assert_eq!(graph.edge_count(), n * (n - 1) / 2);
    assert_eq!(graph.edge_set(), brute_force(&clusters, &tol));
}

#[test]
fn test_adjacency_rule() {
    let exact = AdjacencyTolerance::exact();
    let fine = PixelKey::new(4, 10, 2);
    assert!(pixels_adjacent(&fine, &fine, &exact));
    assert!(!pixels_adjacent(&fine, &PixelKey::new(4, 11, 2), &exact));

    let time1 = AdjacencyTolerance {
        time: 1,
        ..Default::default()
    };
    assert!(pixels_adjacent(&fine, &PixelKey::new(4, 11, 2), &time1));
    assert!(!pixels_adjacent(&fine, &PixelKey::new(4, 12, 2), &time1));

    // scale 5 bin 5 spans scale 4 bins 10..=11, its frequency 4 maps to 2
    let cross = AdjacencyTolerance {
        scale: 1,
        ..Default::default()
    };
    let coarse = PixelKey::new(5, 5, 4);
    assert!(pixels_adjacent(&fine, &coarse, &cross));
    assert!(pixels_adjacent(&coarse, &fine, &cross));
    assert!(!pixels_adjacent(&fine, &PixelKey::new(5, 5, 6), &cross));
    assert!(!pixels_adjacent(&fine, &PixelKey::new(6, 2, 8), &cross));
}

#[test]
fn test_adjacent_pixel_and_shift_labels() {
    let a = cluster("bank0", 0, &[(4, 10, 2, 1.0)]);
    let b = cluster("bank0", 1, &[(6, 30, 7, 1.0)]);
    let c = cluster("bank0", 3, &[(6, 40, 7, 1.0)]);
    let d = cluster("bank1", 0, &[(4, 11, 2, 1.0)]);

    let mut builder = GraphBuilder::default().with_tolerance(AdjacencyTolerance {
        time: 1,
        ..Default::default()
    });
    builder.add_clusters([a.clone(), b.clone(), c.clone(), d.clone()]);
    let graph = builder.build().unwrap();
    let expected: BTreeSet<(NodeId, NodeId, EdgeLabel)> = [
        (node("bank0", 0), node("bank0", 1), EdgeLabel::AdjacentShift),
        (node("bank0", 0), node("bank1", 0), EdgeLabel::AdjacentPixel),
    ]
    .into_iter()
    .collect();
    assert_eq!(graph.edge_set(), expected);
    assert_eq!(graph.degree(&node("bank0", 0)), 2);
    assert_eq!(graph.degree(&node("bank0", 3)), 0);

    let mut unlinked = GraphBuilder::default().with_adjacent_shifts(false);
    unlinked.add_clusters([a, b, c, d]);
    assert_eq!(unlinked.build().unwrap().edge_count(), 0);
}

#[test]
fn test_integrity_errors() {
    let mut duplicate = GraphBuilder::default();
    duplicate.add_cluster(cluster("bank0", 0, &[(4, 1, 1, 1.0)]));
    duplicate.add_cluster(cluster("bank0", 0, &[(4, 2, 1, 1.0)]));
    assert!(matches!(
        duplicate.build(),
        Err(WavegraphError::InputIntegrity(_))
    ));

    let mut other_rate = meta("bank1", 0);
    other_rate.sample_rate = 2048.0;
    let odd = Cluster::new(
        other_rate,
        vec![Pixel {
            scale: 4,
            time: 1,
            freq: 1,
            value: 1.0,
            amplitude: 0.0,
        }],
        Diagnostics::new(1, 0.0, StopReason::Exhausted),
    )
    .unwrap();
    let mut mixed = GraphBuilder::default();
    mixed.add_cluster(cluster("bank0", 0, &[(4, 1, 1, 1.0)]));
    mixed.add_cluster(odd);
    assert!(matches!(mixed.build(), Err(WavegraphError::InputIntegrity(_))));
}

#[test]
fn test_empty_inputs_and_stores() {
    let graph = GraphBuilder::default().build().unwrap();
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.edge_count(), 0);

    let store = ClusterStore::new("batch").with_clusters(vec![
        cluster("bank0", 0, &[(4, 1, 1, 1.0)]),
        cluster("bank0", 1, &[]),
    ]);
    let mut builder = GraphBuilder::default();
    builder.add_store(store);
    let graph = builder.build().unwrap();
    assert_eq!(graph.node_count(), 2, "empty clusters are still nodes");
    assert_eq!(graph.edge_count(), 1);
    assert!(graph.node(&node("bank0", 1)).unwrap().cluster.is_empty());
}

#[test]
fn test_adjacency_matrix_is_symmetric() {
    let mut builder = GraphBuilder::default();
    builder.add_clusters(random_clusters(5, 4, 3));
    let graph = builder.build().unwrap();
    let adj = graph.adjacency_matrix();
    assert_eq!(adj.shape(), (graph.node_count(), graph.node_count()));
    assert_eq!(adj.nnz(), 2 * graph.edge_count());
    for (&v, (i, j)) in adj.iter() {
        assert_eq!(v, 1.0);
        assert_ne!(i, j);
        assert_eq!(adj.get(j, i), Some(&1.0));
    }
}

#[test]
fn test_node_id_and_label_text() {
    let id: NodeId = "bank0:12".parse().unwrap();
    assert_eq!(id, node("bank0", 12));
    assert_eq!(id.to_string(), "bank0:12");
    assert!("bank0".parse::<NodeId>().is_err());
    assert!("bank0:x".parse::<NodeId>().is_err());
    assert!(":3".parse::<NodeId>().is_err());

    assert!(EdgeLabel::SharedPixel > EdgeLabel::AdjacentPixel);
    assert!(EdgeLabel::AdjacentPixel > EdgeLabel::AdjacentShift);
    assert_eq!("adjacent-pixel".parse::<EdgeLabel>().unwrap(), EdgeLabel::AdjacentPixel);

    assert!(matches!(
        GraphEdge::new(id.clone(), id, EdgeLabel::SharedPixel),
        Err(WavegraphError::InputIntegrity(_))
    ));
}
