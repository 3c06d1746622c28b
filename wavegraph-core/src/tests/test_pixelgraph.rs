use approx::assert_relative_eq;
use tempfile::TempDir;

use crate::cluster::{Cluster, Diagnostics, StopReason};
use crate::error::WavegraphError;
use crate::grid::Grid;
use crate::pixel::{Pixel, PixelKey, PixelOrdering};
use crate::pixelgraph::PixelGraph;
use crate::tests::{cluster, meta, SAMPLE_RATE};

fn two_paths() -> Vec<Cluster> {
    vec![
        cluster("bank0", 0, &[(4, 1, 1, 1.0), (4, 2, 1, 2.0)]),
        cluster("bank0", 1, &[(4, 2, 1, 4.0), (4, 3, 2, 1.0)]),
    ]
}

#[test]
fn test_paths_merge_into_dag() {
    crate::init();
    let graph = PixelGraph::from_clusters(&two_paths()).unwrap();
    let a = PixelKey::new(4, 1, 1);
    let b = PixelKey::new(4, 2, 1);
    let c = PixelKey::new(4, 3, 2);

    assert_eq!(graph.len(), 3);
    assert_eq!(graph.sorted(), &[a, b, c]);
    assert!(graph.ancestors(&a).unwrap().is_empty());
    assert!(graph.ancestors(&b).unwrap().contains(&a));
    assert!(graph.ancestors(&c).unwrap().contains(&b));
    assert!(graph.is_head(&b) && graph.is_head(&c));
    assert!(!graph.is_head(&a));

    let stats = graph.stats(&b).unwrap();
    assert_eq!(stats.count, 2);
    assert_relative_eq!(stats.mean, 3.0);
    assert_relative_eq!(stats.std, 1.0);
    assert_eq!(graph.span(), 4);
}

#[test]
fn test_cycle_is_an_integrity_error() {
    let key_a = (4, 1, 2);
    let key_b = (4, 2, 1);
    // frequency-major puts b first
    let forward = cluster("bank0", 0, &[(4, 1, 2, 1.0), (4, 2, 1, 1.0)]);
    let mut time_major = meta("bank0", 1);
    time_major.ordering = PixelOrdering::parse(&["time"]).unwrap();
    let backward = Cluster::new(
        time_major,
        [key_a, key_b]
            .iter()
            .map(|&(scale, time, freq)| Pixel {
                scale,
                time,
                freq,
                value: 1.0,
                amplitude: 0.0,
            })
            .collect(),
        Diagnostics::new(1, 0.0, StopReason::Exhausted),
    )
    .unwrap();

    let result = PixelGraph::from_clusters([&forward, &backward]);
    assert!(matches!(result, Err(WavegraphError::InputIntegrity(_))));
}

#[test]
fn test_text_rendering() {
    let dir = TempDir::new().unwrap();
    let grid = Grid::new(SAMPLE_RATE, 4, 6).unwrap();
    let graph = PixelGraph::from_clusters(&two_paths()).unwrap();
    let text = graph.to_text(&grid);
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(
        lines[0],
        "## nodeID time_idx freq_idx scale_idx value_avg value_stdev endnode ancestors"
    );
    assert_eq!(lines[1], "0 1 1 4 1 0 0");
    assert!(lines[2].starts_with("## 0: a=0.015625, t=0.015625 s"));
    assert_eq!(lines[3], "1 2 1 4 3 1 1 0");
    assert_eq!(lines[5], "2 3 2 4 1 0 1 1");

    let path = dir.path().join("pixels.txt");
    graph.write(&path, &grid, "template bank0").unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("# template bank0\n## nodeID"));
}

#[test]
fn test_empty_graph() {
    let graph = PixelGraph::from_clusters(&[cluster("bank0", 0, &[])]).unwrap();
    assert!(graph.is_empty());
    assert_eq!(graph.span(), 0);
    assert!(graph.head_nodes().is_empty());
}
