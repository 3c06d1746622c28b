//! Basis pursuit denoising (CBPDN): L1-regularized least squares.
//!
//! Minimizes `F(x) = ½‖y − Dx‖² + γ‖x‖₁` over admissible coefficients. The
//! non-zero support of the solution becomes the cluster. Solvers are
//! pluggable through [`SparseSolver`]; any solver honouring the same stopping
//! contract can replace [`Ista`]:
//! - converged when `|ΔF| ≤ cv_threshold` and `|ΔF| / |F_prev| ≤ cv_diff`
//! - or when the relative residual is at or below `approx_error`
//! - otherwise the lowest-objective iterate after `max_iterations`, flagged
//!   as not converged

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::cluster::{Diagnostics, IterationRecord, Method, StopReason};
use crate::error::{Result, WavegraphError};
use crate::selector::{distance, energy, norm, PixelSelector, Problem, Solution};

/// Solver for the L1-penalized problem.
pub trait SparseSolver {
    fn name(&self) -> &'static str;

    fn solve(&self, problem: &Problem, params: &CbpdnParams) -> Solution;
}

/// Closed set of solvers selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    #[default]
    Ista,
}

impl SolverKind {
    pub fn solver(&self) -> Box<dyn SparseSolver> {
        match self {
            SolverKind::Ista => Box::new(Ista),
        }
    }
}

/// Parameters for CBPDN.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CbpdnParams {
    /// L1 penalty weight γ.
    pub gamma: f64,
    /// Step is `1 / (κ L)` with `L` the dictionary Lipschitz bound.
    pub kappa: f64,
    /// Stop once the relative residual energy is at or below this value.
    pub approx_error: Option<f64>,
    /// Absolute tolerance on the objective change.
    pub cv_threshold: f64,
    /// Relative tolerance on the objective change.
    pub cv_diff: f64,
    pub max_iterations: usize,
    /// Refit the coefficients by least squares on the found support.
    pub debias: bool,
    pub solver: SolverKind,
}

impl Default for CbpdnParams {
    fn default() -> Self {
        Self {
            gamma: 0.1,
            kappa: 1.0,
            approx_error: None,
            cv_threshold: 1e-9,
            cv_diff: 1e-6,
            max_iterations: 1000,
            debias: true,
            solver: SolverKind::Ista,
        }
    }
}

/// CBPDN selector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cbpdn {
    pub params: CbpdnParams,
}

impl Cbpdn {
    pub fn new(params: CbpdnParams) -> Self {
        Self { params }
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.params.gamma = gamma;
        self
    }

    pub fn with_kappa(mut self, kappa: f64) -> Self {
        self.params.kappa = kappa;
        self
    }

    pub fn with_tolerances(mut self, cv_threshold: f64, cv_diff: f64) -> Self {
        self.params.cv_threshold = cv_threshold;
        self.params.cv_diff = cv_diff;
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

    pub fn with_debias(mut self, debias: bool) -> Self {
        self.params.debias = debias;
        self
    }
}

impl PixelSelector for Cbpdn {
    fn method(&self) -> Method {
        Method::Cbpdn
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        if !(p.gamma.is_finite() && p.gamma >= 0.0) {
            return Err(WavegraphError::config(format!(
                "gamma must be non-negative, got {}",
                p.gamma
            )));
        }
        if !(p.kappa.is_finite() && p.kappa > 0.0) {
            return Err(WavegraphError::config(format!(
                "kappa must be positive, got {}",
                p.kappa
            )));
        }
        for (name, v) in [("cv_threshold", p.cv_threshold), ("cv_diff", p.cv_diff)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(WavegraphError::config(format!(
                    "{} must be non-negative, got {}",
                    name, v
                )));
            }
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
        let solver = self.params.solver.solver();
        debug!(
            "cbpdn: solver {}, gamma {}, kappa {}",
            solver.name(),
            self.params.gamma,
            self.params.kappa
        );
        let mut solution = solver.solve(problem, &self.params);
        if self.params.debias {
            debias(problem, &mut solution, &self.params);
        }
        Ok(solution)
    }
}

/// `½‖r‖² + γ‖x‖₁`
fn objective(residual: &[f64], coeffs: &[f64], gamma: f64) -> f64 {
    0.5 * energy(residual) + gamma * coeffs.iter().map(|c| c.abs()).sum::<f64>()
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    if v > t {
        v - t
    } else if v < -t {
        v + t
    } else {
        0.0
    }
}

/// Iterative shrinkage-thresholding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ista;

impl SparseSolver for Ista {
    fn name(&self) -> &'static str {
        "ista"
    }

    fn solve(&self, problem: &Problem, params: &CbpdnParams) -> Solution {
        let step = 1.0 / (params.kappa * problem.dictionary.lipschitz());
        let shrink = step * params.gamma;

        let mut x = vec![0.0; problem.len()];
        let mut residual = problem.target.clone();
        let mut f_prev = objective(&residual, &x, params.gamma);

        let mut best = x.clone();
        let mut best_f = f_prev;
        let mut best_error = problem.relative_error(&residual);
        let mut history = Vec::new();
        let mut cv = None;
        let mut stop = StopReason::IterationLimit;
        let mut iterations = 0;

        while iterations < params.max_iterations {
            let g = problem.gradient(&residual);
            let next: Vec<f64> = x
                .iter()
                .zip(&g)
                .zip(&problem.admissible)
                .map(|((xi, gi), ok)| {
                    if *ok {
                        soft_threshold(xi + step * gi, shrink)
                    } else {
                        0.0
                    }
                })
                .collect();
            residual = problem.residual(&next);
            let error = problem.relative_error(&residual);
            let f = objective(&residual, &next, params.gamma);
            let delta = (f - f_prev).abs();
            let rel = if f_prev.abs() > 0.0 {
                delta / f_prev.abs()
            } else {
                0.0
            };
            let next_norm = norm(&next);
            cv = Some(if next_norm > 0.0 {
                distance(&next, &x) / next_norm
            } else {
                0.0
            });
            iterations += 1;
            x = next;

            if f < best_f || iterations == 1 {
                best.clone_from(&x);
                best_f = f;
                best_error = error;
            }
            trace!(
                "ista iter {}: F {:.6e}, |dF| {:.3e}, residual {:.4e}",
                iterations,
                f,
                delta,
                error
            );
            if problem.verbose {
                history.push(IterationRecord {
                    iteration: iterations,
                    residual_error: error,
                    support: Problem::support(&x).len(),
                    cv,
                    objective: Some(f),
                });
            }

            if params.approx_error.is_some_and(|tol| error <= tol) {
                stop = StopReason::ToleranceReached;
                break;
            }
            if delta <= params.cv_threshold && rel <= params.cv_diff {
                stop = StopReason::Converged;
                break;
            }
            f_prev = f;
        }

        // a converged run ends on its last iterate, a failed one on its best
        let (coeffs, f, error) = if stop.is_converged() {
            let f = objective(&residual, &x, params.gamma);
            let error = problem.relative_error(&residual);
            (x, f, error)
        } else {
            (best, best_f, best_error)
        };
        let mut diagnostics = Diagnostics::new(iterations, error, stop);
        diagnostics.cv = cv;
        diagnostics.objective = Some(f);
        diagnostics.history = history;
        Solution {
            coeffs,
            diagnostics,
        }
    }
}

/// Least-squares refit restricted to the current support (projected
/// gradient with step `1/L`). Shrinks the L1 bias without moving the support.
fn debias(problem: &Problem, solution: &mut Solution, params: &CbpdnParams) {
    let support = Problem::support(&solution.coeffs);
    if support.is_empty() {
        return;
    }
    let step = 1.0 / problem.dictionary.lipschitz();
    let mut x = solution.coeffs.clone();
    let mut residual = problem.residual(&x);
    for _ in 0..params.max_iterations {
        let g = problem.gradient(&residual);
        let mut next = x.clone();
        for &i in &support {
            next[i] += step * g[i];
        }
        let change = distance(&next, &x);
        let scale = norm(&next);
        x = next;
        residual = problem.residual(&x);
        if scale == 0.0 || change / scale <= params.cv_diff.max(1e-12) {
            break;
        }
    }
    let error = problem.relative_error(&residual);
    trace!(
        "cbpdn debias: residual {:.4e} -> {:.4e}",
        solution.diagnostics.residual_error,
        error
    );
    solution.coeffs = x;
    solution.diagnostics.residual_error = error;
}
