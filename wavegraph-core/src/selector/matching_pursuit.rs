//! Greedy matching pursuit.
//!
//! Each step picks the admissible atom with the largest normalized
//! correlation `|⟨r, dᵢ⟩| / ‖dᵢ‖` (ties go to the pixel that comes first in
//! the configured ordering), adds `⟨r, dᵢ⟩ / ‖dᵢ‖²` to its coefficient and
//! subtracts that contribution from the residual. With the orthonormal
//! dictionary this simply consumes the selected cell.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::cluster::{Diagnostics, IterationRecord, Method, StopReason};
use crate::error::{Result, WavegraphError};
use crate::selector::{PixelSelector, Problem, Solution, RESIDUAL_EPS};

/// Parameters for matching pursuit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchingPursuitParams {
    /// Fixed budget of distinct pixels.
    pub max_pixels: Option<usize>,
    /// Stop once the relative residual energy is at or below this value.
    pub approx_error: Option<f64>,
    /// Atoms whose normalized correlation is at or below this are ignored.
    pub noise_floor: f64,
    /// Safety bound; defaults to four times the admissible atom count.
    pub max_iterations: Option<usize>,
}

impl Default for MatchingPursuitParams {
    fn default() -> Self {
        Self {
            max_pixels: None,
            approx_error: None,
            noise_floor: 0.0,
            max_iterations: None,
        }
    }
}

/// Matching pursuit selector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchingPursuit {
    pub params: MatchingPursuitParams,
}

impl MatchingPursuit {
    pub fn new(params: MatchingPursuitParams) -> Self {
        Self { params }
    }

    pub fn with_max_pixels(mut self, max_pixels: usize) -> Self {
        self.params.max_pixels = Some(max_pixels);
        self
    }

    pub fn with_approx_error(mut self, approx_error: f64) -> Self {
        self.params.approx_error = Some(approx_error);
        self
    }

    pub fn with_noise_floor(mut self, noise_floor: f64) -> Self {
        self.params.noise_floor = noise_floor;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.params.max_iterations = Some(max_iterations);
        self
    }
}

impl PixelSelector for MatchingPursuit {
    fn method(&self) -> Method {
        Method::MatchingPursuit
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        if p.max_pixels == Some(0) {
            return Err(WavegraphError::config("max_pixels must be at least 1"));
        }
        if let Some(e) = p.approx_error {
            if !(e.is_finite() && e >= 0.0) {
                return Err(WavegraphError::config(format!(
                    "approx_error must be non-negative, got {}",
                    e
                )));
            }
        }
        if !(p.noise_floor.is_finite() && p.noise_floor >= 0.0) {
            return Err(WavegraphError::config(format!(
                "noise_floor must be non-negative, got {}",
                p.noise_floor
            )));
        }
        if p.max_iterations == Some(0) {
            return Err(WavegraphError::config("max_iterations must be at least 1"));
        }
        Ok(())
    }

    fn solve(&self, problem: &Problem) -> Result<Solution> {
        let p = &self.params;
        let dict = problem.dictionary.as_ref();
        let n = problem.len();

        let norms_sq: Vec<f64> = (0..n).map(|i| dict.atom_norm_sq(i)).collect();
        let cap = p
            .max_iterations
            .unwrap_or_else(|| 4 * problem.admissible_count().max(1));

        let mut coeffs = vec![0.0; n];
        let mut residual = problem.target.clone();
        let mut error = problem.relative_error(&residual);
        let mut distinct = 0usize;
        let mut iterations = 0usize;
        let mut history = Vec::new();

        let stop = loop {
            if p.approx_error.is_some_and(|tol| error <= tol) {
                break StopReason::ToleranceReached;
            }
            if p.max_pixels.is_some_and(|k| distinct >= k) {
                break StopReason::BudgetReached;
            }
            if error <= RESIDUAL_EPS {
                break StopReason::Exhausted;
            }
            if iterations >= cap {
                break StopReason::IterationLimit;
            }

            let corr = dict.analyze(&residual);
            let scores: Vec<f64> = corr
                .iter()
                .zip(&norms_sq)
                .map(|(c, n2)| if *n2 > 0.0 { c.abs() / n2.sqrt() } else { 0.0 })
                .collect();
            let Some(best) = problem.argmax(&scores) else {
                break StopReason::Exhausted;
            };
            if scores[best] <= p.noise_floor {
                break StopReason::Exhausted;
            }

            let step = corr[best] / norms_sq[best];
            let was_zero = coeffs[best] == 0.0;
            coeffs[best] += step;
            match (was_zero, coeffs[best] == 0.0) {
                (true, false) => distinct += 1,
                (false, true) => distinct -= 1,
                _ => {}
            }
            for (j, w) in dict.atom(best) {
                residual[j] -= step * w;
            }

            iterations += 1;
            error = problem.relative_error(&residual);
            trace!(
                "mp iter {}: picked {} (score {:.4e}), residual {:.4e}",
                iterations,
                problem.layout.key_of(best),
                scores[best],
                error
            );
            if problem.verbose {
                history.push(IterationRecord {
                    iteration: iterations,
                    residual_error: error,
                    support: distinct,
                    cv: None,
                    objective: None,
                });
            }
        };

        let mut diagnostics = Diagnostics::new(iterations, error, stop);
        diagnostics.history = history;
        Ok(Solution {
            coeffs,
            diagnostics,
        })
    }
}
