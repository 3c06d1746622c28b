use std::collections::BTreeSet;

use tempfile::TempDir;

use wavegraph_core::graph::{read_edge_list, EdgeLabel};
use wavegraph_core::{ClusterStore, NodeId, StopReason, WavegraphError};

use crate::builder::{PipelineBuilder, GRAPH_FILE, STORE_DIR};
use crate::stages::graph::GraphStage;
use crate::tests::{config, map};

fn id(text: &str) -> NodeId {
    text.parse().unwrap()
}

fn two_templates() -> Vec<wavegraph_core::TimeFrequencyMap> {
    vec![
        map("a", 4, 6, &[(5, 10, 3, 2.0)]),
        map("b", 4, 6, &[(5, 10, 3, -1.0)]),
    ]
}

#[test]
fn test_end_to_end_run() {
    crate::init();
    let dir = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .with_config(config())
        .with_maps(two_templates())
        .with_output_dir(dir.path())
        .build()
        .unwrap();
    let report = pipeline.run().unwrap();

    assert!(report.is_complete());
    assert_eq!(report.templates, 2);
    assert_eq!(report.units, 4);
    assert_eq!(report.clusters, 4);
    assert_eq!(report.non_converged, 0);
    assert_eq!(report.nodes, 4);
    assert_eq!(report.edges, 4);
    assert_eq!(
        report.store_files,
        vec![
            dir.path().join(STORE_DIR).join("a.json"),
            dir.path().join(STORE_DIR).join("b.json"),
        ]
    );

    // right-aligned shift 1 moves scale 5 content back by two bins
    let store = ClusterStore::read(&report.store_files[0]).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.clusters()[1].contains(&wavegraph_core::PixelKey::new(5, 8, 3)));
    assert_eq!(store.params["method"], "matchingpursuit");

    let list = read_edge_list(dir.path().join(GRAPH_FILE)).unwrap();
    let expected: BTreeSet<(NodeId, NodeId, EdgeLabel)> = [
        (id("a:0"), id("a:1"), EdgeLabel::AdjacentShift),
        (id("a:0"), id("b:0"), EdgeLabel::SharedPixel),
        (id("a:1"), id("b:1"), EdgeLabel::SharedPixel),
        (id("b:0"), id("b:1"), EdgeLabel::AdjacentShift),
    ]
    .into_iter()
    .collect();
    assert_eq!(list.edge_set(), expected);
    assert!(list.header.iter().any(|l| l == "method: matchingpursuit"));
}

#[test]
fn test_failed_unit_loses_only_its_template() {
    crate::init();
    let dir = TempDir::new().unwrap();
    let mut maps = two_templates();
    // scale 4 is missing, so the configured range cannot be decomposed
    maps.push(map("c", 5, 6, &[(5, 10, 3, 1.0)]));

    let report = PipelineBuilder::new()
        .with_config(config())
        .with_maps(maps)
        .with_output_dir(dir.path())
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 2);
    for failure in &report.failures {
        assert_eq!(failure.template.as_str(), "c");
        assert!(matches!(failure.error, WavegraphError::InputIntegrity(_)));
    }
    assert_eq!(report.store_files.len(), 2);
    assert!(!dir.path().join(STORE_DIR).join("c.json").exists());
    assert_eq!(report.nodes, 4);
    assert_eq!(report.edges, 4);
}

#[test]
fn test_batch_inconsistencies_fail_fast() {
    let dir = TempDir::new().unwrap();
    let mut other_rate = wavegraph_core::TimeFrequencyMap::zeros(
        "fast".parse().unwrap(),
        2048.0,
        1.0,
        4,
        6,
        8,
    )
    .unwrap();
    other_rate
        .set(&wavegraph_core::PixelKey::new(4, 3, 1), 1.0)
        .unwrap();
    let mut short = config();
    short.segment_duration = 0.5;

    let cases = vec![
        (config(), vec![map("a", 4, 6, &[]), other_rate]),
        (config(), vec![map("a", 4, 6, &[]), map("a", 4, 6, &[])]),
        (short, vec![map("a", 4, 6, &[])]),
    ];
    for (config, maps) in cases {
        let result = PipelineBuilder::new()
            .with_config(config)
            .with_maps(maps)
            .with_output_dir(dir.path())
            .build()
            .unwrap()
            .run();
        assert!(matches!(result, Err(WavegraphError::InputIntegrity(_))));
    }
    assert!(!dir.path().join(STORE_DIR).exists(), "nothing written");
}

#[test]
fn test_builder_validation() {
    let missing_config = PipelineBuilder::new().with_output_dir("out").build();
    assert!(matches!(missing_config, Err(WavegraphError::Configuration(_))));

    let missing_dir = PipelineBuilder::new().with_config(config()).build();
    assert!(matches!(missing_dir, Err(WavegraphError::Configuration(_))));

    let mut invalid = config();
    invalid.max_scale = 2;
    let result = PipelineBuilder::new()
        .with_config(invalid)
        .with_output_dir("out")
        .build();
    assert!(matches!(result, Err(WavegraphError::Configuration(_))));

    let zero_threads = PipelineBuilder::new()
        .with_config(config())
        .with_output_dir("out")
        .with_num_threads(0)
        .build();
    assert!(matches!(zero_threads, Err(WavegraphError::Configuration(_))));

    let nested = PipelineBuilder::new()
        .with_config(config())
        .with_output_dir("out")
        .with_graph_file("sub/graph.txt")
        .build();
    assert!(matches!(nested, Err(WavegraphError::Configuration(_))));
}

#[test]
fn test_dedicated_pool_matches_global_pool() {
    let global_dir = TempDir::new().unwrap();
    let pool_dir = TempDir::new().unwrap();
    let maps = vec![
        map("a", 4, 6, &[(4, 20, 2, 1.0), (6, 7, 5, 0.5)]),
        map("b", 4, 6, &[(4, 21, 2, 1.0)]),
        map("c", 4, 6, &[(6, 7, 5, 3.0), (5, 2, 1, 0.2)]),
    ];
    let mut cfg = config();
    cfg.num_time_shift = 3;
    cfg.approx_error = Some(1e-6);

    let run = |dir: &TempDir, threads: Option<usize>| {
        let mut builder = PipelineBuilder::new()
            .with_config(cfg.clone())
            .with_maps(maps.clone())
            .with_output_dir(dir.path())
            .with_graph_file("edges.txt");
        if let Some(n) = threads {
            builder = builder.with_num_threads(n);
        }
        builder.build().unwrap().run().unwrap();
        read_edge_list(dir.path().join("edges.txt")).unwrap()
    };
    let global = run(&global_dir, None);
    let pooled = run(&pool_dir, Some(2));
    assert_eq!(global.edge_set(), pooled.edge_set());
    assert_eq!(global.nodes, pooled.nodes);
    assert_eq!(global.nodes.len(), 9);
}

#[test]
fn test_non_converged_units_are_counted() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config();
    cfg.num_time_shift = 1;
    cfg.approx_error = None;
    cfg.max_iterations = Some(1);

    let report = PipelineBuilder::new()
        .with_config(cfg)
        .with_map(map("a", 4, 6, &[(4, 1, 1, 3.0), (5, 2, 2, 2.0), (6, 3, 3, 1.0)]))
        .with_output_dir(dir.path())
        .build()
        .unwrap()
        .run()
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.non_converged, 1);

    let store = ClusterStore::read(&report.store_files[0]).unwrap();
    let diag = store.clusters()[0].diagnostics();
    assert_eq!(diag.stop_reason, StopReason::IterationLimit);
    assert!(!diag.converged);
}

#[test]
fn test_graph_stage_rejoins_store_directory() {
    let dir = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .with_config(config())
        .with_maps(two_templates())
        .with_output_dir(dir.path())
        .build()
        .unwrap();
    pipeline.run().unwrap();
    let first = read_edge_list(pipeline.graph_path()).unwrap();

    let rejoined = dir.path().join("rejoined.txt");
    let stage = GraphStage::from_dir(pipeline.config(), pipeline.store_dir(), rejoined.clone())
        .unwrap();
    assert_eq!(stage.inputs.len(), 2);
    let output = stage.execute().unwrap();
    assert_eq!(output.graph.edge_set(), first.edge_set());
    assert_eq!(read_edge_list(&rejoined).unwrap().edge_set(), first.edge_set());
}
