//! Graph assembly from clusters.
//!
//! Edge derivation uses an inverted index `PixelKey → [node]` instead of an
//! all-pairs scan: every pixel of every node probes the keys inside its
//! tolerance window, clipped to the occupied keys of each scale.
//!
//! ### Adjacency rule
//! Two pixels are adjacent when their scales differ by at most
//! `tolerance.scale` and, after projecting the coarser-time pixel onto the
//! finer grid (a tile of `2^Δs` time bins, frequency index divided by
//! `2^Δs`), the time gap is at most `tolerance.time` and the frequency gap at
//! most `tolerance.freq`. The default tolerance is exact match.
//!
//! ### Determinism
//! Nodes are sorted by [`NodeId`] before indexing and edges are keyed by the
//! canonical `(low, high)` node indices, so the edge set does not depend on
//! input order or on the parallel schedule. Each key keeps the strongest
//! label seen.

use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::error::{Result, WavegraphError};
use crate::graph::{EdgeLabel, Graph, GraphEdge, GraphNode, NodeId};
use crate::pixel::PixelKey;
use crate::store::ClusterStore;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Window within which two pixels count as overlapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjacencyTolerance {
    /// Maximum scale difference.
    pub scale: u32,
    /// Maximum time gap, in bins of the finer of the two scales.
    pub time: usize,
    /// Maximum frequency gap, in bins of the finer-time scale.
    pub freq: usize,
}

impl AdjacencyTolerance {
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn is_exact(&self) -> bool {
        *self == Self::default()
    }
}

/// Configuration for graph assembly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub tolerance: AdjacencyTolerance,
    /// Link same-template clusters at consecutive shifts.
    pub link_adjacent_shifts: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            tolerance: AdjacencyTolerance::exact(),
            link_adjacent_shifts: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Adjacency
// ─────────────────────────────────────────────────────────────────────────────

/// Symmetric pixel adjacency test (see module docs).
pub fn pixels_adjacent(a: &PixelKey, b: &PixelKey, tol: &AdjacencyTolerance) -> bool {
    let (fine, coarse) = if a.scale <= b.scale { (a, b) } else { (b, a) };
    let ds = coarse.scale - fine.scale;
    if ds > tol.scale || ds >= usize::BITS {
        return false;
    }
    let r = 1usize << ds;
    let t_lo = coarse.time * r;
    let t_hi = t_lo + r - 1;
    let time_gap = if fine.time < t_lo {
        t_lo - fine.time
    } else {
        fine.time.saturating_sub(t_hi)
    };
    let freq_gap = fine.freq.abs_diff(coarse.freq / r);
    time_gap <= tol.time && freq_gap <= tol.freq
}

/// Occupied keys of one scale with their bounding box.
#[derive(Debug, Default)]
struct ScaleKeys {
    keys: Vec<PixelKey>,
    max_time: usize,
    max_freq: usize,
}

impl ScaleKeys {
    fn push(&mut self, key: PixelKey) {
        self.max_time = self.max_time.max(key.time);
        self.max_freq = self.max_freq.max(key.freq);
        self.keys.push(key);
    }
}

/// Every occupied key that may be adjacent to `p`.
///
/// The probe window is clipped to the occupied bounding box of each scale;
/// when it still holds more cells than the scale has keys, the keys are
/// scanned directly.
fn candidate_keys(
    p: &PixelKey,
    tol: &AdjacencyTolerance,
    occupied: &BTreeMap<u32, ScaleKeys>,
) -> Vec<PixelKey> {
    if tol.is_exact() {
        return vec![*p];
    }
    let lo = p.scale.saturating_sub(tol.scale);
    let hi = p.scale.saturating_add(tol.scale);
    let mut out = Vec::new();
    for (&s, scale_keys) in occupied.range(lo..=hi) {
        let ds = s.abs_diff(p.scale);
        if ds >= usize::BITS {
            continue;
        }
        let r = 1usize << ds;
        let (t_lo, t_hi, f_lo, f_hi) = if s == p.scale {
            (
                p.time.saturating_sub(tol.time),
                p.time.saturating_add(tol.time),
                p.freq.saturating_sub(tol.freq),
                p.freq.saturating_add(tol.freq),
            )
        } else if s > p.scale {
            // candidate has the coarser time grid
            (
                p.time.saturating_sub(tol.time) / r,
                p.time.saturating_add(tol.time) / r,
                p.freq.saturating_sub(tol.freq).saturating_mul(r),
                p.freq
                    .saturating_add(tol.freq)
                    .saturating_mul(r)
                    .saturating_add(r - 1),
            )
        } else {
            let start = p.time.saturating_mul(r);
            (
                start.saturating_sub(tol.time),
                start.saturating_add(r - 1).saturating_add(tol.time),
                (p.freq / r).saturating_sub(tol.freq),
                (p.freq / r).saturating_add(tol.freq),
            )
        };
        let t_hi = t_hi.min(scale_keys.max_time);
        let f_hi = f_hi.min(scale_keys.max_freq);
        if t_lo > t_hi || f_lo > f_hi {
            continue;
        }
        let window = (t_hi - t_lo + 1).saturating_mul(f_hi - f_lo + 1);
        if window > scale_keys.keys.len() {
            out.extend(
                scale_keys
                    .keys
                    .iter()
                    .filter(|q| pixels_adjacent(p, q, tol))
                    .copied(),
            );
        } else {
            for time in t_lo..=t_hi {
                for freq in f_lo..=f_hi {
                    out.push(PixelKey::new(s, time, freq));
                }
            }
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Collects clusters, then derives the graph in one pass.
#[derive(Clone, Debug, Default)]
pub struct GraphBuilder {
    config: GraphConfig,
    clusters: Vec<Cluster>,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            clusters: Vec::new(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: AdjacencyTolerance) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    pub fn with_adjacent_shifts(mut self, link: bool) -> Self {
        self.config.link_adjacent_shifts = link;
        self
    }

    pub fn add_cluster(&mut self, cluster: Cluster) -> &mut Self {
        self.clusters.push(cluster);
        self
    }

    pub fn add_clusters(&mut self, clusters: impl IntoIterator<Item = Cluster>) -> &mut Self {
        self.clusters.extend(clusters);
        self
    }

    pub fn add_store(&mut self, store: ClusterStore) -> &mut Self {
        self.clusters.extend(store.into_clusters());
        self
    }

    /// Canonicalize nodes and check cross-input integrity.
    fn prepare_nodes(clusters: Vec<Cluster>) -> Result<Vec<GraphNode>> {
        let mut nodes: Vec<GraphNode> = clusters
            .into_iter()
            .map(|cluster| GraphNode {
                id: NodeId::of(&cluster),
                cluster,
            })
            .collect();
        nodes.sort_by(|x, y| x.id.cmp(&y.id));

        if let Some(w) = nodes.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(WavegraphError::integrity(format!(
                "duplicate cluster for node {}",
                w[0].id
            )));
        }
        if let Some(first) = nodes.first() {
            let rate = first.cluster.meta().sample_rate;
            if let Some(odd) = nodes.iter().find(|n| {
                let r = n.cluster.meta().sample_rate;
                (r - rate).abs() > 1e-9 * rate.abs().max(1.0)
            }) {
                return Err(WavegraphError::integrity(format!(
                    "sample rate mismatch: node {} at {} Hz, node {} at {} Hz",
                    first.id,
                    rate,
                    odd.id,
                    odd.cluster.meta().sample_rate
                )));
            }
        }
        Ok(nodes)
    }

    /// Derive the graph. All inputs must already be materialized.
    pub fn build(self) -> Result<Graph> {
        let GraphBuilder { config, clusters } = self;
        let nodes = Self::prepare_nodes(clusters)?;
        let n = nodes.len();
        info!(
            "Building graph over {} clusters (tolerance {:?}, adjacent shifts: {})",
            n, config.tolerance, config.link_adjacent_shifts
        );

        // inverted index, node lists ascending by construction
        let mut index: HashMap<PixelKey, Vec<usize>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            for key in node.cluster.keys() {
                index.entry(key).or_default().push(i);
            }
        }
        let mut occupied: BTreeMap<u32, ScaleKeys> = BTreeMap::new();
        for key in index.keys() {
            occupied.entry(key.scale).or_default().push(*key);
        }
        debug!(
            "pixel index: {} distinct keys over {} scales",
            index.len(),
            occupied.len()
        );

        let edges: DashMap<(usize, usize), EdgeLabel> = DashMap::new();
        let tol = config.tolerance;
        (0..n).into_par_iter().for_each(|a| {
            for p in nodes[a].cluster.keys() {
                for q in candidate_keys(&p, &tol, &occupied) {
                    let Some(owners) = index.get(&q) else {
                        continue;
                    };
                    if !pixels_adjacent(&p, &q, &tol) {
                        continue;
                    }
                    let label = if p == q {
                        EdgeLabel::SharedPixel
                    } else {
                        EdgeLabel::AdjacentPixel
                    };
                    for &b in owners.iter().filter(|&&b| b > a) {
                        edges
                            .entry((a, b))
                            .and_modify(|l| {
                                if label > *l {
                                    *l = label
                                }
                            })
                            .or_insert(label);
                    }
                }
            }
        });

        if config.link_adjacent_shifts {
            for i in 1..n {
                let (prev, cur) = (&nodes[i - 1].id, &nodes[i].id);
                if prev.template == cur.template && cur.time_shift == prev.time_shift + 1 {
                    edges.entry((i - 1, i)).or_insert(EdgeLabel::AdjacentShift);
                }
            }
        }

        let mut pairs: Vec<((usize, usize), EdgeLabel)> = edges.into_iter().collect();
        pairs.sort_unstable_by_key(|(k, _)| *k);
        let edges = pairs
            .into_iter()
            .map(|((a, b), label)| GraphEdge::new(nodes[a].id.clone(), nodes[b].id.clone(), label))
            .collect::<Result<Vec<_>>>()?;

        info!("Graph built: {} nodes, {} edges", n, edges.len());
        Ok(Graph::from_parts(nodes, edges))
    }
}
