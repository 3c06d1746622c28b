//! Increasing-sparsity normalized iterative hard thresholding (INIHT).
//!
//! Outer levels grow the sparsity `k = start_pixels, start_pixels +
//! step_pixels, …` so the support never shrinks between levels. At each
//! level a normalized IHT runs until successive iterates stop changing:
//!
//! ```text
//! g  = Dᵀ(y − D x)
//! μ  = ‖g_S‖² / ‖D g_S‖²          S = supp(x), or top-k of g when x = 0
//! x' = H_k(x + μ g)
//! while supp(x') ≠ S and μ > (1 − c) ‖x' − x‖² / ‖D(x' − x)‖²:
//!     μ ← μ / (κ (1 − c)),  recompute x'
//! ```
//!
//! Reference: Blumensath & Davies (2010), "Normalized iterative hard
//! thresholding: guaranteed stability and performance".

use log::trace;
use serde::{Deserialize, Serialize};

use crate::cluster::{Diagnostics, IterationRecord, Method, StopReason};
use crate::error::{Result, WavegraphError};
use crate::selector::{distance, energy, norm, PixelSelector, Problem, Solution, RESIDUAL_EPS};

/// Backtracking steps allowed per iteration.
const MAX_BACKTRACK: usize = 50;

/// Parameters for INIHT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InihtParams {
    /// Initial sparsity level k₀.
    pub start_pixels: usize,
    /// Sparsity increment Δk between levels.
    pub step_pixels: usize,
    /// Step-size shrinkage constant, in (0, 1).
    pub c: f64,
    /// Backtracking factor, must exceed `1 / (1 − c)`.
    pub kappa: f64,
    /// Relative change between iterates below which a level has converged.
    pub cv_threshold: f64,
    /// Stop once the relative residual energy is at or below this value.
    pub approx_error: Option<f64>,
    /// Safety bound on the total number of iterations.
    pub max_iterations: usize,
}

impl Default for InihtParams {
    fn default() -> Self {
        Self {
            start_pixels: 1,
            step_pixels: 1,
            c: 0.01,
            kappa: 2.0,
            cv_threshold: 1e-6,
            approx_error: None,
            max_iterations: 1000,
        }
    }
}

/// INIHT selector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Iniht {
    pub params: InihtParams,
}

impl Iniht {
    pub fn new(params: InihtParams) -> Self {
        Self { params }
    }

    pub fn with_sparsity(mut self, start_pixels: usize, step_pixels: usize) -> Self {
        self.params.start_pixels = start_pixels;
        self.params.step_pixels = step_pixels;
        self
    }

    pub fn with_step(mut self, c: f64, kappa: f64) -> Self {
        self.params.c = c;
        self.params.kappa = kappa;
        self
    }

    pub fn with_cv_threshold(mut self, cv_threshold: f64) -> Self {
        self.params.cv_threshold = cv_threshold;
        self
    }

    pub fn with_approx_error(mut self, approx_error: f64) -> Self {
        self.params.approx_error = Some(approx_error);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.params.max_iterations = max_iterations;
        self
    }

    /// Normalized step `‖g_S‖² / ‖D g_S‖²`, or `1 / L` when undefined.
    fn step_size(problem: &Problem, g: &[f64], support: &[usize]) -> f64 {
        let mut g_s = vec![0.0; g.len()];
        for &i in support {
            g_s[i] = g[i];
        }
        let num = energy(&g_s);
        let den = energy(&problem.dictionary.synthesize(&g_s));
        if num > 0.0 && den > 0.0 {
            num / den
        } else {
            1.0 / problem.dictionary.lipschitz()
        }
    }

    /// One normalized IHT update at sparsity `k`, with backtracking.
    fn update(&self, problem: &Problem, x: &[f64], g: &[f64], k: usize) -> Vec<f64> {
        let p = &self.params;
        let mut support = Problem::support(x);
        if support.is_empty() {
            support = problem.top_k(g, k);
            support.sort_unstable();
        }
        let mut mu = Self::step_size(problem, g, &support);

        let mut backtracks = 0;
        loop {
            let candidate: Vec<f64> = x.iter().zip(g).map(|(xi, gi)| xi + mu * gi).collect();
            let next = problem.hard_threshold(&candidate, k);
            if Problem::support(&next) == support || backtracks >= MAX_BACKTRACK {
                return next;
            }
            let diff: Vec<f64> = next.iter().zip(x).map(|(a, b)| a - b).collect();
            let d_diff = energy(&problem.dictionary.synthesize(&diff));
            let omega = if d_diff > 0.0 {
                (1.0 - p.c) * energy(&diff) / d_diff
            } else {
                f64::INFINITY
            };
            if mu <= omega {
                return next;
            }
            mu /= p.kappa * (1.0 - p.c);
            backtracks += 1;
        }
    }
}

impl PixelSelector for Iniht {
    fn method(&self) -> Method {
        Method::Iniht
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        if p.start_pixels == 0 {
            return Err(WavegraphError::config("start_pixels must be at least 1"));
        }
        if p.step_pixels == 0 {
            return Err(WavegraphError::config("step_pixels must be at least 1"));
        }
        if !(p.c.is_finite() && p.c > 0.0 && p.c < 1.0) {
            return Err(WavegraphError::config(format!(
                "c must lie in (0, 1), got {}",
                p.c
            )));
        }
        if !(p.kappa.is_finite() && p.kappa > 1.0 / (1.0 - p.c)) {
            return Err(WavegraphError::config(format!(
                "kappa must exceed 1/(1-c) = {:.4}, got {}",
                1.0 / (1.0 - p.c),
                p.kappa
            )));
        }
        if !(p.cv_threshold.is_finite() && p.cv_threshold > 0.0) {
            return Err(WavegraphError::config(format!(
                "cv_threshold must be positive, got {}",
                p.cv_threshold
            )));
        }
        if let Some(e) = p.approx_error {
            if !(e.is_finite() && e >= 0.0) {
                return Err(WavegraphError::config(format!(
                    "approx_error must be non-negative, got {}",
                    e
                )));
            }
        }
        if p.max_iterations == 0 {
            return Err(WavegraphError::config("max_iterations must be at least 1"));
        }
        Ok(())
    }

    fn solve(&self, problem: &Problem) -> Result<Solution> {
        let p = &self.params;
        let n = problem.len();
        let admissible = problem.admissible_count();

        let mut x = vec![0.0; n];
        let mut residual = problem.target.clone();
        let mut error = problem.relative_error(&residual);
        let mut k = p.start_pixels.min(admissible.max(1));
        let mut iterations = 0usize;
        let mut cv: Option<f64> = None;
        let mut history = Vec::new();
        let mut level_start_error = error;

        if admissible == 0 || error <= RESIDUAL_EPS {
            let mut diagnostics = Diagnostics::new(0, error, StopReason::Exhausted);
            diagnostics.sparsity = Some(0);
            return Ok(Solution {
                coeffs: x,
                diagnostics,
            });
        }

        let stop = 'levels: loop {
            // normalized IHT at sparsity k
            loop {
                if iterations >= p.max_iterations {
                    break 'levels StopReason::IterationLimit;
                }
                let g = problem.gradient(&residual);
                let next = self.update(problem, &x, &g, k);
                let next_residual = problem.residual(&next);
                let next_error = problem.relative_error(&next_residual);
                let next_norm = norm(&next);
                let change = if next_norm > 0.0 {
                    distance(&next, &x) / next_norm
                } else {
                    0.0
                };
                iterations += 1;
                cv = Some(change);
                trace!(
                    "iniht iter {} (k={}): residual {:.4e}, cv {:.4e}",
                    iterations,
                    k,
                    next_error,
                    change
                );
                if problem.verbose {
                    history.push(IterationRecord {
                        iteration: iterations,
                        residual_error: next_error,
                        support: Problem::support(&next).len(),
                        cv: Some(change),
                        objective: None,
                    });
                }

                // only accept updates that do not increase the residual
                if next_error > error * (1.0 + 1e-12) + RESIDUAL_EPS {
                    break;
                }
                x = next;
                residual = next_residual;
                error = next_error;
                if change <= p.cv_threshold {
                    break;
                }
            }

            if p.approx_error.is_some_and(|tol| error <= tol) {
                break StopReason::ToleranceReached;
            }
            if error <= RESIDUAL_EPS {
                break StopReason::Exhausted;
            }
            if k >= admissible {
                break StopReason::Converged;
            }
            let improvement = if level_start_error > 0.0 {
                (level_start_error - error) / level_start_error
            } else {
                0.0
            };
            if k > p.start_pixels && improvement <= p.cv_threshold {
                break StopReason::Saturated;
            }
            level_start_error = error;
            k = (k + p.step_pixels).min(admissible);
        };

        let mut diagnostics = Diagnostics::new(iterations, error, stop);
        diagnostics.cv = cv;
        diagnostics.sparsity = Some(k);
        diagnostics.history = history;
        Ok(Solution {
            coeffs: x,
            diagnostics,
        })
    }
}
