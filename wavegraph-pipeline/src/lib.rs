//! Batch execution for wavegraph: decompose every (template, time shift)
//! unit in parallel, persist the clusters, then join them into the graph.

pub mod builder;
pub mod stages;

use std::path::Path;

use log::{info, warn};

use wavegraph_core::{Result, RunConfig, TimeFrequencyMap};

pub use builder::{Pipeline, PipelineBuilder};
pub use stages::{PipelineReport, UnitFailure};

/// 1. Preflight and per-unit decomposition, one store per template
/// 2. Barrier join of the written stores
/// 3. Graph assembly and edge list
pub fn execute_stages(
    config: &RunConfig,
    maps: &[TimeFrequencyMap],
    store_dir: &Path,
    graph_path: &Path,
) -> Result<PipelineReport> {
    use crate::stages::clustering::ClusteringStage;
    use crate::stages::graph::GraphStage;

    info!(
        "Starting wavegraph pipeline: {} templates, method {}",
        maps.len(),
        config.method
    );

    // Stage A: clustering
    let clustering = ClusteringStage {
        config,
        store_dir: store_dir.to_path_buf(),
    };
    let cluster_output = clustering.execute(maps)?;
    if !cluster_output.failures.is_empty() {
        warn!(
            "{} units failed; their templates are left out of the graph",
            cluster_output.failures.len()
        );
    }

    // Stage B: graph
    let graph_stage = GraphStage {
        config,
        inputs: cluster_output.store_files.clone(),
        output: graph_path.to_path_buf(),
    };
    let graph_output = graph_stage.execute()?;

    let report = PipelineReport {
        templates: maps.len(),
        units: maps.len() * config.num_time_shift,
        clusters: cluster_output.clusters,
        non_converged: cluster_output.non_converged,
        failures: cluster_output.failures,
        store_files: cluster_output.store_files,
        graph_file: Some(graph_output.path),
        nodes: graph_output.graph.node_count(),
        edges: graph_output.graph.edge_count(),
    };
    info!(
        "Pipeline complete: {} clusters, {} nodes, {} edges",
        report.clusters, report.nodes, report.edges
    );
    Ok(report)
}

#[cfg(test)]
mod tests;

/// Initialize logging for tests
#[cfg(test)]
pub(crate) fn init() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
