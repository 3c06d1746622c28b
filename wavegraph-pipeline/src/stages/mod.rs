//! Pipeline stages.
//!
//! Stage A decomposes every (template, time shift) unit independently and
//! persists one cluster store per template. Stage B is the barrier join: it
//! reads the materialized stores and assembles the graph.

pub mod clustering;
pub mod graph;

use std::path::PathBuf;

use wavegraph_core::{TemplateId, WavegraphError};

/// A unit of work that did not produce a cluster.
#[derive(Debug)]
pub struct UnitFailure {
    pub template: TemplateId,
    pub time_shift: usize,
    pub error: WavegraphError,
}

/// Summary of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub templates: usize,
    pub units: usize,
    pub clusters: usize,
    /// Clusters whose selector hit its iteration bound.
    pub non_converged: usize,
    pub failures: Vec<UnitFailure>,
    pub store_files: Vec<PathBuf>,
    pub graph_file: Option<PathBuf>,
    pub nodes: usize,
    pub edges: usize,
}

impl PipelineReport {
    /// Every unit produced a cluster and the graph was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.graph_file.is_some()
    }
}
