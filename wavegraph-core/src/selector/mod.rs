//! Sparse pixel selection on time-frequency maps.
//!
//! Three interchangeable algorithms sit behind the [`PixelSelector`] trait:
//!
//! | Variant | Module | Support control |
//! | :-- | :-- | :-- |
//! | Matching pursuit | [`matching_pursuit`] | greedy, one atom per step |
//! | INIHT | [`iniht`] | hard threshold, sparsity grown by `step_pixels` |
//! | CBPDN | [`cbpdn`] | L1 penalty `gamma`, pluggable solver |
//!
//! Every variant follows the same flow: validate its own parameters, restrict
//! the map to the requested scales, build a [`Problem`] (flat target signal,
//! admissible mask, dictionary), run its solver to a [`Solution`], then turn
//! the non-zero coefficients into a [`Cluster`].
//!
//! Decomposition is a pure function of (map, parameters, context): the
//! verbose flag only changes what is recorded in the diagnostics.

pub mod cbpdn;
pub mod iniht;
pub mod matching_pursuit;

use std::cmp::Ordering;

use log::{debug, warn};
use ordered_float::OrderedFloat;

use crate::cluster::{Cluster, ClusterMeta, Diagnostics, Method};
use crate::dictionary::{Dictionary, DictionaryKind};
use crate::error::{Result, WavegraphError};
use crate::pixel::{Pixel, PixelKey, PixelOrdering};
use crate::template::Alignment;
use crate::tfmap::{GridLayout, TimeFrequencyMap};

pub use cbpdn::{Cbpdn, CbpdnParams, Ista, SparseSolver, SolverKind};
pub use iniht::{Iniht, InihtParams};
pub use matching_pursuit::{MatchingPursuit, MatchingPursuitParams};

/// Relative residual below which a target counts as fully explained.
pub(crate) const RESIDUAL_EPS: f64 = 1e-12;

// ──────────────────────────────────────────────────────────────────────────────
// Context
// ──────────────────────────────────────────────────────────────────────────────

/// Settings shared by all selectors for one unit of work.
#[derive(Clone, Debug)]
pub struct DecompositionContext {
    pub time_shift: usize,
    pub alignment: Alignment,
    pub ordering: PixelOrdering,
    /// Never select frequency index 0.
    pub reject_zero_freq: bool,
    /// Restrict decomposition to these scales; `None` uses the whole map.
    pub scale_range: Option<(u32, u32)>,
    pub dictionary: DictionaryKind,
    /// Record per-iteration history in the diagnostics.
    pub verbose: bool,
}

impl Default for DecompositionContext {
    fn default() -> Self {
        Self {
            time_shift: 0,
            alignment: Alignment::Right,
            ordering: PixelOrdering::default(),
            reject_zero_freq: true,
            scale_range: None,
            dictionary: DictionaryKind::Orthonormal,
            verbose: false,
        }
    }
}

impl DecompositionContext {
    pub fn with_time_shift(mut self, time_shift: usize) -> Self {
        self.time_shift = time_shift;
        self
    }

    pub fn with_ordering(mut self, ordering: PixelOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_reject_zero_freq(mut self, reject: bool) -> Self {
        self.reject_zero_freq = reject;
        self
    }

    pub fn with_scale_range(mut self, min_scale: u32, max_scale: u32) -> Self {
        self.scale_range = Some((min_scale, max_scale));
        self
    }

    pub fn with_dictionary(mut self, dictionary: DictionaryKind) -> Self {
        self.dictionary = dictionary;
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some((lo, hi)) = self.scale_range {
            if hi < lo {
                return Err(WavegraphError::config(format!(
                    "max_scale ({}) < min_scale ({})",
                    hi, lo
                )));
            }
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Problem and solution
// ──────────────────────────────────────────────────────────────────────────────

/// Flattened decomposition problem shared by all solvers.
pub struct Problem {
    pub layout: GridLayout,
    /// Target signal `y`, zero on inadmissible cells.
    pub target: Vec<f64>,
    /// Cells that may carry a coefficient.
    pub admissible: Vec<bool>,
    pub dictionary: Box<dyn Dictionary>,
    pub ordering: PixelOrdering,
    pub verbose: bool,
    target_energy: f64,
}

impl Problem {
    pub fn new(map: &TimeFrequencyMap, ctx: &DecompositionContext) -> Result<Self> {
        let layout = map.layout();
        let mut target = map.to_signal();
        let admissible: Vec<bool> = (0..layout.len())
            .map(|i| !(ctx.reject_zero_freq && layout.key_of(i).freq == 0))
            .collect();
        for (y, ok) in target.iter_mut().zip(&admissible) {
            if !ok {
                *y = 0.0;
            }
        }
        let dictionary = ctx.dictionary.build(&layout)?;
        let target_energy = energy(&target);
        Ok(Self {
            layout,
            target,
            admissible,
            dictionary,
            ordering: ctx.ordering.clone(),
            verbose: ctx.verbose,
            target_energy,
        })
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn admissible_count(&self) -> usize {
        self.admissible.iter().filter(|&&a| a).count()
    }

    pub fn target_energy(&self) -> f64 {
        self.target_energy
    }

    /// `y − D x`
    pub fn residual(&self, coeffs: &[f64]) -> Vec<f64> {
        let approx = self.dictionary.synthesize(coeffs);
        self.target
            .iter()
            .zip(approx)
            .map(|(y, a)| y - a)
            .collect()
    }

    /// `‖r‖² / ‖y‖²`, zero for an all-zero target.
    pub fn relative_error(&self, residual: &[f64]) -> f64 {
        if self.target_energy <= 0.0 {
            return 0.0;
        }
        energy(residual) / self.target_energy
    }

    /// Gradient of `½‖y − Dx‖²` negated: `Dᵀ(y − Dx)`, zero off the mask.
    pub fn gradient(&self, residual: &[f64]) -> Vec<f64> {
        let mut g = self.dictionary.analyze(residual);
        self.mask(&mut g);
        g
    }

    /// Zero every inadmissible entry.
    pub fn mask(&self, values: &mut [f64]) {
        for (v, ok) in values.iter_mut().zip(&self.admissible) {
            if !ok {
                *v = 0.0;
            }
        }
    }

    /// `true` when `a` ranks before `b` at equal magnitude.
    fn ranks_before(&self, a: usize, b: usize) -> bool {
        self.ordering
            .compare(&self.layout.key_of(a), &self.layout.key_of(b))
            == Ordering::Less
    }

    /// Admissible index of the largest `score`, ties broken by the ordering.
    pub fn argmax(&self, scores: &[f64]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &s) in scores.iter().enumerate() {
            if !self.admissible[i] || !s.is_finite() {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => match OrderedFloat(s).cmp(&OrderedFloat(scores[b])) {
                    Ordering::Greater => Some(i),
                    Ordering::Equal if self.ranks_before(i, b) => Some(i),
                    _ => Some(b),
                },
            };
        }
        best
    }

    /// Indices of the `k` largest non-zero magnitudes among admissible
    /// cells, by decreasing magnitude then by the ordering.
    pub fn top_k(&self, values: &[f64], k: usize) -> Vec<usize> {
        let mut candidates: Vec<(OrderedFloat<f64>, PixelKey, usize)> = values
            .iter()
            .enumerate()
            .filter(|&(i, v)| self.admissible[i] && *v != 0.0 && v.is_finite())
            .map(|(i, v)| (OrderedFloat(v.abs()), self.layout.key_of(i), i))
            .collect();
        candidates.sort_unstable_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| self.ordering.compare(&a.1, &b.1))
        });
        candidates.truncate(k);
        candidates.into_iter().map(|(_, _, i)| i).collect()
    }

    /// Keep the `k` largest entries (see [`Problem::top_k`]), zero the rest.
    pub fn hard_threshold(&self, values: &[f64], k: usize) -> Vec<f64> {
        let mut out = vec![0.0; values.len()];
        for i in self.top_k(values, k) {
            out[i] = values[i];
        }
        out
    }

    /// Sorted indices of non-zero coefficients.
    pub fn support(coeffs: &[f64]) -> Vec<usize> {
        coeffs
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Non-zero coefficients as pixels, unsorted.
    pub fn pixels(&self, coeffs: &[f64]) -> Vec<Pixel> {
        Self::support(coeffs)
            .into_iter()
            .map(|i| {
                let key = self.layout.key_of(i);
                Pixel {
                    scale: key.scale,
                    time: key.time,
                    freq: key.freq,
                    value: coeffs[i],
                    amplitude: 0.0,
                }
            })
            .collect()
    }
}

/// Output of a solver before it becomes a cluster.
#[derive(Clone, Debug)]
pub struct Solution {
    pub coeffs: Vec<f64>,
    pub diagnostics: Diagnostics,
}

pub(crate) fn energy(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

pub(crate) fn norm(values: &[f64]) -> f64 {
    energy(values).sqrt()
}

/// `‖a − b‖`
pub(crate) fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

// ──────────────────────────────────────────────────────────────────────────────
// Public trait
// ──────────────────────────────────────────────────────────────────────────────

/// A sparse decomposition algorithm turning a map into a [`Cluster`].
pub trait PixelSelector {
    fn method(&self) -> Method;

    /// Check the parameters this variant owns.
    fn validate(&self) -> Result<()>;

    /// Run the algorithm on a prepared problem.
    fn solve(&self, problem: &Problem) -> Result<Solution>;

    /// Decompose `map` into a cluster for `ctx.time_shift`.
    fn decompose(&self, map: &TimeFrequencyMap, ctx: &DecompositionContext) -> Result<Cluster> {
        self.validate()?;
        ctx.validate()?;
        let map = match ctx.scale_range {
            Some((lo, hi)) => map.restrict_scales(lo, hi)?,
            None => map.clone(),
        };
        let problem = Problem::new(&map, ctx)?;
        debug!(
            "{}: template {} shift {} ({} cells, {} admissible)",
            self.method(),
            map.template(),
            ctx.time_shift,
            problem.len(),
            problem.admissible_count()
        );

        let solution = self.solve(&problem)?;
        if !solution.diagnostics.converged {
            warn!(
                "{} did not converge for template {} shift {}: {} iterations, residual {:.3e}",
                self.method(),
                map.template(),
                ctx.time_shift,
                solution.diagnostics.iterations,
                solution.diagnostics.residual_error
            );
        }

        let meta = ClusterMeta {
            template: map.template().clone(),
            time_shift: ctx.time_shift,
            method: self.method(),
            sample_rate: map.sample_rate(),
            segment_duration: map.segment_duration(),
            min_scale: map.min_scale(),
            max_scale: map.max_scale(),
            alignment: ctx.alignment,
            reject_zero_freq: ctx.reject_zero_freq,
            ordering: ctx.ordering.clone(),
        };
        let cluster = Cluster::new(meta, problem.pixels(&solution.coeffs), solution.diagnostics)?;
        debug!(
            "{}: template {} shift {} -> {} pixels ({:?}, residual {:.3e})",
            self.method(),
            map.template(),
            ctx.time_shift,
            cluster.len(),
            cluster.diagnostics().stop_reason,
            cluster.diagnostics().residual_error
        );
        Ok(cluster)
    }
}

/// Closed set of selectors, chosen from configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    MatchingPursuit(MatchingPursuit),
    Iniht(Iniht),
    Cbpdn(Cbpdn),
}

impl Selector {
    fn inner(&self) -> &dyn PixelSelector {
        match self {
            Selector::MatchingPursuit(s) => s,
            Selector::Iniht(s) => s,
            Selector::Cbpdn(s) => s,
        }
    }
}

impl PixelSelector for Selector {
    fn method(&self) -> Method {
        self.inner().method()
    }

    fn validate(&self) -> Result<()> {
        self.inner().validate()
    }

    fn solve(&self, problem: &Problem) -> Result<Solution> {
        self.inner().solve(problem)
    }
}

impl From<MatchingPursuit> for Selector {
    fn from(s: MatchingPursuit) -> Self {
        Selector::MatchingPursuit(s)
    }
}

impl From<Iniht> for Selector {
    fn from(s: Iniht) -> Self {
        Selector::Iniht(s)
    }
}

impl From<Cbpdn> for Selector {
    fn from(s: Cbpdn) -> Self {
        Selector::Cbpdn(s)
    }
}
