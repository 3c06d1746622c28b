// Stage A: per-unit decomposition
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use wavegraph_core::store::STORE_EXTENSION;
use wavegraph_core::{
    Cluster, ClusterStore, PixelSelector, Result, RunConfig, TimeFrequencyMap, WavegraphError,
};

use crate::stages::UnitFailure;

pub struct ClusteringStage<'a> {
    pub config: &'a RunConfig,
    /// Directory receiving one store file per template.
    pub store_dir: PathBuf,
}

pub struct ClusteringOutput {
    pub store_files: Vec<PathBuf>,
    pub clusters: usize,
    pub non_converged: usize,
    pub failures: Vec<UnitFailure>,
}

impl<'a> ClusteringStage<'a> {
    /// Decompose every map at every configured time shift.
    ///
    /// Batch-level inconsistencies (duplicate templates, mismatched sample
    /// rates or segment durations) abort before any work. A unit that fails
    /// afterwards only loses its own template's store.
    pub fn execute(&self, maps: &[TimeFrequencyMap]) -> Result<ClusteringOutput> {
        self.preflight(maps)?;
        fs::create_dir_all(&self.store_dir).map_err(|source| WavegraphError::Io {
            path: self.store_dir.clone(),
            source,
        })?;

        let shifts = self.config.num_time_shift;
        let units: Vec<(usize, usize)> = (0..maps.len())
            .flat_map(|m| (0..shifts).map(move |s| (m, s)))
            .collect();
        info!(
            "Decomposing {} units ({} templates x {} shifts) with {}",
            units.len(),
            maps.len(),
            shifts,
            self.config.method
        );

        let selector = self.config.selector();
        let results: Vec<Result<Cluster>> = units
            .par_iter()
            .map(|&(m, shift)| {
                let shifted = maps[m].time_shifted(shift, self.config.waveform_alignment)?;
                selector.decompose(&shifted, &self.config.context(shift))
            })
            .collect();

        let mut per_template: Vec<Vec<Cluster>> = vec![Vec::with_capacity(shifts); maps.len()];
        let mut failures = Vec::new();
        for ((m, shift), result) in units.into_iter().zip(results) {
            match result {
                Ok(cluster) => per_template[m].push(cluster),
                Err(error) => {
                    warn!(
                        "template {} shift {} failed: {}",
                        maps[m].template(),
                        shift,
                        error
                    );
                    failures.push(UnitFailure {
                        template: maps[m].template().clone(),
                        time_shift: shift,
                        error,
                    });
                }
            }
        }

        let params = self.config.to_json()?;
        let mut output = ClusteringOutput {
            store_files: Vec::new(),
            clusters: 0,
            non_converged: 0,
            failures,
        };
        for (map, clusters) in maps.iter().zip(per_template) {
            let template = map.template();
            // a partial template would look like a complete one downstream
            if output.failures.iter().any(|f| &f.template == template) {
                continue;
            }
            let n_clusters = clusters.len();
            let non_converged = clusters
                .iter()
                .filter(|c| !c.diagnostics().converged)
                .count();
            let path = store_path(&self.store_dir, template.as_str());
            ClusterStore::new(format!(
                "template {} ({}, {} time shifts)",
                template, self.config.method, shifts
            ))
            .with_params(params.clone())
            .with_clusters(clusters)
            .write(&path)?;
            if non_converged > 0 {
                debug!("template {}: {} non-converged clusters", template, non_converged);
            }
            output.clusters += n_clusters;
            output.non_converged += non_converged;
            output.store_files.push(path);
        }

        info!(
            "Stage A done: {} clusters in {} stores, {} failed units, {} non-converged",
            output.clusters,
            output.store_files.len(),
            output.failures.len(),
            output.non_converged
        );
        Ok(output)
    }

    fn preflight(&self, maps: &[TimeFrequencyMap]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for map in maps {
            if !seen.insert(map.template()) {
                return Err(WavegraphError::InputIntegrity(format!(
                    "template {} appears more than once",
                    map.template()
                )));
            }
        }
        if let Some(first) = maps.first() {
            let rate = first.sample_rate();
            for map in maps {
                if !same(map.sample_rate(), rate) {
                    return Err(WavegraphError::InputIntegrity(format!(
                        "sample rate mismatch: template {} at {} Hz, template {} at {} Hz",
                        first.template(),
                        rate,
                        map.template(),
                        map.sample_rate()
                    )));
                }
            }
        }
        for map in maps {
            if !same(map.segment_duration(), self.config.segment_duration) {
                return Err(WavegraphError::InputIntegrity(format!(
                    "template {} covers {} s, configured segment-duration is {} s",
                    map.template(),
                    map.segment_duration(),
                    self.config.segment_duration
                )));
            }
        }
        Ok(())
    }
}

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1.0)
}

pub fn store_path(dir: &Path, template: &str) -> PathBuf {
    dir.join(format!("{}.{}", template, STORE_EXTENSION))
}
