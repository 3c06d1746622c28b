//! Directed acyclic graph of pixels built from cluster paths.
//!
//! Each cluster is read as a path through its pixels in cluster order: every
//! pixel's ancestor is the pixel before it. Merging the paths of many
//! clusters gives a DAG whose nodes carry the mean and population standard
//! deviation of the values contributed at that grid point. The last pixel of
//! each cluster is a head node.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

use log::{debug, info, trace};

use crate::cluster::Cluster;
use crate::error::{Result, WavegraphError};
use crate::grid::Grid;
use crate::pixel::PixelKey;
use crate::store::write_atomic;

/// Value statistics of one grid point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Number of clusters that contributed a value.
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PixelGraph {
    ancestors: BTreeMap<PixelKey, BTreeSet<PixelKey>>,
    stats: BTreeMap<PixelKey, NodeStats>,
    heads: BTreeSet<PixelKey>,
    sorted: Vec<PixelKey>,
}

impl PixelGraph {
    /// Merge cluster paths. Fails if the merged paths form a cycle.
    pub fn from_clusters<'a>(clusters: impl IntoIterator<Item = &'a Cluster>) -> Result<Self> {
        let mut ancestors: BTreeMap<PixelKey, BTreeSet<PixelKey>> = BTreeMap::new();
        let mut values: BTreeMap<PixelKey, Vec<f64>> = BTreeMap::new();
        let mut heads = BTreeSet::new();

        for cluster in clusters {
            let keys: Vec<PixelKey> = cluster.keys().collect();
            let Some(last) = keys.last() else {
                continue;
            };
            ancestors.entry(keys[0]).or_default();
            for pair in keys.windows(2) {
                ancestors.entry(pair[1]).or_default().insert(pair[0]);
            }
            for p in cluster.pixels() {
                values.entry(p.key()).or_default().push(p.value);
            }
            heads.insert(*last);
        }

        let stats = values
            .into_iter()
            .map(|(key, vals)| {
                let n = vals.len() as f64;
                let mean = vals.iter().sum::<f64>() / n;
                let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
                trace!("graph point {}: {} values, mean {:.4e}", key, vals.len(), mean);
                (
                    key,
                    NodeStats {
                        mean,
                        std: var.sqrt(),
                        count: vals.len(),
                    },
                )
            })
            .collect();

        let sorted = topological_sort(&ancestors)?;
        debug!(
            "pixel graph: {} nodes, {} head nodes",
            sorted.len(),
            heads.len()
        );
        Ok(Self {
            ancestors,
            stats,
            heads,
            sorted,
        })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Nodes in topological order: ancestors always come first.
    pub fn sorted(&self) -> &[PixelKey] {
        &self.sorted
    }

    pub fn ancestors(&self, key: &PixelKey) -> Option<&BTreeSet<PixelKey>> {
        self.ancestors.get(key)
    }

    pub fn stats(&self, key: &PixelKey) -> Option<&NodeStats> {
        self.stats.get(key)
    }

    pub fn head_nodes(&self) -> &BTreeSet<PixelKey> {
        &self.heads
    }

    pub fn is_head(&self, key: &PixelKey) -> bool {
        self.heads.contains(key)
    }

    /// Time coverage in bins of the largest occupied scale.
    pub fn span(&self) -> usize {
        let Some(scale_max) = self.sorted.iter().map(|k| k.scale).max() else {
            return 0;
        };
        let time_max = self
            .sorted
            .iter()
            .map(|k| k.time << k.scale)
            .max()
            .unwrap_or(0);
        (time_max >> scale_max) + 1
    }

    /// Text rendering with one line per node and a physical-units comment.
    pub fn to_text(&self, grid: &Grid) -> String {
        let mut out = String::from(
            "## nodeID time_idx freq_idx scale_idx value_avg value_stdev endnode ancestors\n",
        );
        let mut ids: BTreeMap<PixelKey, usize> = BTreeMap::new();
        for (id, key) in self.sorted.iter().enumerate() {
            let (mean, std) = self.stats.get(key).map_or((0.0, 0.0), |s| (s.mean, s.std));
            let _ = write!(
                out,
                "{} {} {} {} {} {} {}",
                id,
                key.time,
                key.freq,
                key.scale,
                mean,
                std,
                u8::from(self.is_head(key))
            );
            for anc in self.ancestors.get(key).into_iter().flatten() {
                if let Some(anc_id) = ids.get(anc) {
                    let _ = write!(out, " {}", anc_id);
                }
            }
            let phys = grid.phys_coords(key);
            let _ = writeln!(
                out,
                "\n## {}: a={}, t={} s, f={} Hz",
                id,
                grid.timescale(key.scale),
                phys.time,
                phys.frequency
            );
            ids.insert(*key, id);
        }
        out
    }

    /// Write [`PixelGraph::to_text`] after `metadata` header lines.
    pub fn write(&self, path: impl AsRef<Path>, grid: &Grid, metadata: &str) -> Result<()> {
        let path = path.as_ref();
        let mut text = String::new();
        for line in metadata.lines() {
            let _ = writeln!(text, "# {}", line);
        }
        text.push_str(&self.to_text(grid));
        write_atomic(path, text.as_bytes())?;
        info!("Wrote pixel graph ({} nodes) to {}", self.len(), path.display());
        Ok(())
    }
}

/// Kahn's algorithm; ready nodes are taken in key order so the result is
/// deterministic.
fn topological_sort(ancestors: &BTreeMap<PixelKey, BTreeSet<PixelKey>>) -> Result<Vec<PixelKey>> {
    let mut pending: BTreeMap<PixelKey, usize> =
        ancestors.iter().map(|(k, a)| (*k, a.len())).collect();
    let mut children: BTreeMap<PixelKey, Vec<PixelKey>> = BTreeMap::new();
    for (node, parents) in ancestors {
        for p in parents {
            children.entry(*p).or_default().push(*node);
        }
    }

    let mut ready: BTreeSet<PixelKey> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut sorted = Vec::with_capacity(ancestors.len());
    while let Some(node) = ready.pop_first() {
        sorted.push(node);
        for child in children.get(&node).into_iter().flatten() {
            if let Some(n) = pending.get_mut(child) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(*child);
                }
            }
        }
    }

    if sorted.len() != ancestors.len() {
        return Err(WavegraphError::integrity(format!(
            "pixel paths form a cycle through {} nodes",
            ancestors.len() - sorted.len()
        )));
    }
    Ok(sorted)
}
