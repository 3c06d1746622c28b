use std::path::PathBuf;

use log::debug;

use wavegraph_core::{Result, RunConfig, TimeFrequencyMap, WavegraphError};

use crate::stages::PipelineReport;

/// Default name of the edge list written under the output directory.
pub const GRAPH_FILE: &str = "graph.txt";

/// Sub-directory holding the per-template cluster stores.
pub const STORE_DIR: &str = "clusters";

/// Configures a batch run: decompose all maps, then assemble the graph.
///
/// ```ignore
/// let report = PipelineBuilder::new()
///     .with_config(RunConfig::from_file("run.json")?)
///     .with_maps(maps)
///     .with_output_dir("out")
///     .with_num_threads(8)
///     .build()?
///     .run()?;
/// ```
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    config: Option<RunConfig>,
    maps: Vec<TimeFrequencyMap>,
    output_dir: Option<PathBuf>,
    graph_file: Option<String>,
    num_threads: Option<usize>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_map(mut self, map: TimeFrequencyMap) -> Self {
        self.maps.push(map);
        self
    }

    pub fn with_maps(mut self, maps: impl IntoIterator<Item = TimeFrequencyMap>) -> Self {
        self.maps.extend(maps);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_graph_file(mut self, name: impl Into<String>) -> Self {
        self.graph_file = Some(name.into());
        self
    }

    /// Size of a dedicated worker pool; the global rayon pool otherwise.
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let config = self
            .config
            .ok_or_else(|| WavegraphError::Configuration("pipeline needs a run configuration".into()))?;
        config.validate()?;
        let output_dir = self
            .output_dir
            .ok_or_else(|| WavegraphError::Configuration("pipeline needs an output directory".into()))?;
        if self.num_threads == Some(0) {
            return Err(WavegraphError::Configuration(
                "num_threads must be at least 1".into(),
            ));
        }
        let graph_file = self.graph_file.unwrap_or_else(|| GRAPH_FILE.to_string());
        if graph_file.is_empty() || graph_file.contains(std::path::MAIN_SEPARATOR) {
            return Err(WavegraphError::Configuration(format!(
                "graph file name '{}' must be a plain file name",
                graph_file
            )));
        }
        debug!(
            "Pipeline configured: {} maps, output {}",
            self.maps.len(),
            output_dir.display()
        );
        Ok(Pipeline {
            config,
            maps: self.maps,
            output_dir,
            graph_file,
            num_threads: self.num_threads,
        })
    }
}

/// A validated, ready-to-run batch.
#[derive(Debug)]
pub struct Pipeline {
    config: RunConfig,
    maps: Vec<TimeFrequencyMap>,
    output_dir: PathBuf,
    graph_file: String,
    num_threads: Option<usize>,
}

impl Pipeline {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store_dir(&self) -> PathBuf {
        self.output_dir.join(STORE_DIR)
    }

    pub fn graph_path(&self) -> PathBuf {
        self.output_dir.join(&self.graph_file)
    }

    pub fn run(&self) -> Result<PipelineReport> {
        match self.num_threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| {
                        WavegraphError::Configuration(format!("cannot start worker pool: {}", e))
                    })?;
                pool.install(|| self.execute())
            }
            None => self.execute(),
        }
    }

    fn execute(&self) -> Result<PipelineReport> {
        crate::execute_stages(&self.config, &self.maps, &self.store_dir(), &self.graph_path())
    }
}
