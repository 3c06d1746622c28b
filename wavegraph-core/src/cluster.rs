//! Clusters: the ordered pixel sets selected for one (template, time-shift).
//!
//! A [`Cluster`] is immutable once built. Construction and deserialization
//! both enforce its invariants:
//! - pixels are sorted by the cluster's [`PixelOrdering`]
//! - no two pixels share a (scale, time, frequency) triple
//! - no frequency-0 pixel when zero-frequency rejection is on
//! - every pixel scale lies within the cluster's scale range

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WavegraphError};
use crate::pixel::{normalise_amplitudes, Pixel, PixelKey, PixelOrdering};
use crate::template::{Alignment, TemplateId};

/// Decomposition method that produced a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    MatchingPursuit,
    Iniht,
    Cbpdn,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::MatchingPursuit => "matchingpursuit",
            Method::Iniht => "iniht",
            Method::Cbpdn => "cbpdn",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = WavegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "matchingpursuit" => Ok(Method::MatchingPursuit),
            "iniht" => Ok(Method::Iniht),
            "cbpdn" => Ok(Method::Cbpdn),
            other => Err(WavegraphError::config(format!(
                "unknown method '{}' (expected matchingpursuit, iniht or cbpdn)",
                other
            ))),
        }
    }
}

/// Why a selector stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Residual error fell below `approx_error`.
    ToleranceReached,
    /// The fixed pixel budget was filled.
    BudgetReached,
    /// Nothing above the noise floor is left to select.
    Exhausted,
    /// Successive iterates stopped changing.
    Converged,
    /// Growing the support no longer improves the residual.
    Saturated,
    /// Safety iteration bound hit before any other criterion.
    IterationLimit,
}

impl StopReason {
    pub fn is_converged(&self) -> bool {
        !matches!(self, StopReason::IterationLimit)
    }
}

/// One iteration of a selector, recorded in verbose mode only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub residual_error: f64,
    pub support: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<f64>,
}

/// Convergence diagnostics attached to every cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub iterations: usize,
    /// Relative residual energy `‖y − Dx‖² / ‖y‖²`.
    pub residual_error: f64,
    pub converged: bool,
    pub stop_reason: StopReason,
    /// Relative change between the last two iterates (iterative methods).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<f64>,
    /// Final value of the L1-penalized objective (CBPDN).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<f64>,
    /// Final sparsity level (INIHT).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparsity: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<IterationRecord>,
}

impl Diagnostics {
    pub fn new(iterations: usize, residual_error: f64, stop_reason: StopReason) -> Self {
        Self {
            iterations,
            residual_error,
            converged: stop_reason.is_converged(),
            stop_reason,
            cv: None,
            objective: None,
            sparsity: None,
            history: Vec::new(),
        }
    }
}

/// Identity and provenance of a cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterMeta {
    pub template: TemplateId,
    pub time_shift: usize,
    pub method: Method,
    pub sample_rate: f64,
    pub segment_duration: f64,
    pub min_scale: u32,
    pub max_scale: u32,
    pub alignment: Alignment,
    pub reject_zero_freq: bool,
    pub ordering: PixelOrdering,
}

/// Ordered, duplicate-free pixels of one (template, time-shift).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClusterRecord")]
pub struct Cluster {
    meta: ClusterMeta,
    pixels: Vec<Pixel>,
    diagnostics: Diagnostics,
}

/// Unchecked serialized form of a [`Cluster`].
#[derive(Deserialize)]
struct ClusterRecord {
    meta: ClusterMeta,
    pixels: Vec<Pixel>,
    diagnostics: Diagnostics,
}

impl TryFrom<ClusterRecord> for Cluster {
    type Error = WavegraphError;

    fn try_from(record: ClusterRecord) -> Result<Self> {
        let cluster = Cluster {
            meta: record.meta,
            pixels: record.pixels,
            diagnostics: record.diagnostics,
        };
        cluster.check_invariants()?;
        Ok(cluster)
    }
}

impl Cluster {
    /// Sort pixels by the meta ordering, fill amplitudes and check invariants.
    pub fn new(meta: ClusterMeta, mut pixels: Vec<Pixel>, diagnostics: Diagnostics) -> Result<Self> {
        meta.ordering.sort(&mut pixels);
        normalise_amplitudes(&mut pixels);
        let cluster = Self {
            meta,
            pixels,
            diagnostics,
        };
        cluster.check_invariants()?;
        Ok(cluster)
    }

    fn check_invariants(&self) -> Result<()> {
        let meta = &self.meta;
        if meta.max_scale < meta.min_scale {
            return Err(WavegraphError::integrity(format!(
                "cluster {}:{} has max_scale {} < min_scale {}",
                meta.template, meta.time_shift, meta.max_scale, meta.min_scale
            )));
        }
        let mut seen = HashSet::with_capacity(self.pixels.len());
        for (i, p) in self.pixels.iter().enumerate() {
            if !seen.insert(p.key()) {
                return Err(WavegraphError::integrity(format!(
                    "cluster {}:{} has duplicate pixel {}",
                    meta.template,
                    meta.time_shift,
                    p.key()
                )));
            }
            if meta.reject_zero_freq && p.freq == 0 {
                return Err(WavegraphError::integrity(format!(
                    "cluster {}:{} rejects zero frequency but holds {}",
                    meta.template,
                    meta.time_shift,
                    p.key()
                )));
            }
            if !(meta.min_scale..=meta.max_scale).contains(&p.scale) {
                return Err(WavegraphError::integrity(format!(
                    "cluster {}:{}: pixel {} outside scales {}..={}",
                    meta.template,
                    meta.time_shift,
                    p.key(),
                    meta.min_scale,
                    meta.max_scale
                )));
            }
            if !p.value.is_finite() {
                return Err(WavegraphError::integrity(format!(
                    "cluster {}:{}: non-finite value at {}",
                    meta.template,
                    meta.time_shift,
                    p.key()
                )));
            }
            if i > 0 {
                let prev = self.pixels[i - 1].key();
                if meta.ordering.compare(&prev, &p.key()) != std::cmp::Ordering::Less {
                    return Err(WavegraphError::integrity(format!(
                        "cluster {}:{}: pixels not sorted by ordering {}",
                        meta.template, meta.time_shift, meta.ordering
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn meta(&self) -> &ClusterMeta {
        &self.meta
    }

    pub fn template(&self) -> &TemplateId {
        &self.meta.template
    }

    pub fn time_shift(&self) -> usize {
        self.meta.time_shift
    }

    pub fn method(&self) -> Method {
        self.meta.method
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = PixelKey> + '_ {
        self.pixels.iter().map(|p| p.key())
    }

    pub fn contains(&self, key: &PixelKey) -> bool {
        self.pixels.iter().any(|p| p.key() == *key)
    }

    /// `Σ value²` over the cluster pixels.
    pub fn energy(&self) -> f64 {
        self.pixels.iter().map(|p| p.value * p.value).sum()
    }

    /// Same cluster with pixels moved by `delta(scale)` time bins.
    fn with_times(&self, delta: impl Fn(u32) -> usize) -> Result<Self> {
        let pixels = self
            .pixels
            .iter()
            .map(|p| Pixel {
                time: p.time - delta(p.scale),
                ..p.clone()
            })
            .collect();
        Cluster::new(self.meta.clone(), pixels, self.diagnostics.clone())
    }
}

/// Move a set of clusters so the earliest pixel lands at time index 0.
///
/// Shifts are whole tiles of the largest occupied scale, so plane `s` moves
/// by `k · 2^(s_max − s)` bins for a common `k`.
pub fn shift_to_zero_index(clusters: &[Cluster]) -> Result<Vec<Cluster>> {
    let all = || clusters.iter().flat_map(|c| c.pixels().iter());
    let Some(scale_max) = all().map(|p| p.scale).max() else {
        return Ok(clusters.to_vec());
    };
    // earliest pixel start, in samples
    let time_min = all().map(|p| p.time << p.scale).min().unwrap_or(0);
    let tiles = time_min >> scale_max;
    debug!(
        "shifting {} clusters by {} tiles of scale {}",
        clusters.len(),
        tiles,
        scale_max
    );
    if tiles == 0 {
        return Ok(clusters.to_vec());
    }
    clusters
        .iter()
        .map(|c| c.with_times(|s| tiles << (scale_max - s)))
        .collect()
}
