// Stage B: barrier join and graph assembly
use std::path::PathBuf;

use log::info;

use wavegraph_core::graph::write_edge_list;
use wavegraph_core::store::store_files;
use wavegraph_core::{ClusterStore, Graph, GraphBuilder, Result, RunConfig};

pub struct GraphStage<'a> {
    pub config: &'a RunConfig,
    /// Store files to join; every one must already be written.
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

pub struct GraphOutput {
    pub graph: Graph,
    pub path: PathBuf,
}

impl<'a> GraphStage<'a> {
    /// Join every store found in `dir`.
    pub fn from_dir(config: &'a RunConfig, dir: impl Into<PathBuf>, output: PathBuf) -> Result<Self> {
        let dir = dir.into();
        Ok(Self {
            config,
            inputs: store_files(&dir)?,
            output,
        })
    }

    pub fn execute(&self) -> Result<GraphOutput> {
        info!("Joining {} cluster stores", self.inputs.len());
        let mut builder = GraphBuilder::new(self.config.graph_config());
        for path in &self.inputs {
            builder.add_store(ClusterStore::read(path)?);
        }
        let graph = builder.build()?;

        let description = format!(
            "method: {}\nstores: {}\nadjacency: scale {} time {} freq {}",
            self.config.method,
            self.inputs.len(),
            self.config.adjacency.scale,
            self.config.adjacency.time,
            self.config.adjacency.freq
        );
        write_edge_list(&self.output, &graph, &description)?;
        info!(
            "Stage B done: {} nodes, {} edges -> {}",
            graph.node_count(),
            graph.edge_count(),
            self.output.display()
        );
        Ok(GraphOutput {
            graph,
            path: self.output.clone(),
        })
    }
}
