//! Synthesis dictionaries over a [`GridLayout`].
//!
//! Atoms are stored sparsely as `(flat index, weight)` pairs. Synthesis is
//! `D x`, analysis is the adjoint `Dᵀ r`. Both built-in dictionaries are
//! square: one atom per grid cell.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WavegraphError};
use crate::tfmap::GridLayout;

/// Linear synthesis operator used by the pixel selectors.
pub trait Dictionary: Send + Sync {
    /// Number of atoms (equal to the signal length).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-zero entries of atom `idx` in signal space.
    fn atom(&self, idx: usize) -> Vec<(usize, f64)>;

    /// `‖d_idx‖²`
    fn atom_norm_sq(&self, idx: usize) -> f64 {
        self.atom(idx).iter().map(|(_, w)| w * w).sum()
    }

    /// Upper bound on the largest eigenvalue of `DᵀD`.
    fn lipschitz(&self) -> f64;

    /// `D x`
    fn synthesize(&self, coeffs: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.len()];
        for (i, &c) in coeffs.iter().enumerate() {
            if c == 0.0 {
                continue;
            }
            for (j, w) in self.atom(i) {
                out[j] += c * w;
            }
        }
        out
    }

    /// `Dᵀ r`
    fn analyze(&self, signal: &[f64]) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.atom(i).iter().map(|&(j, w)| w * signal[j]).sum())
            .collect()
    }
}

/// Identity dictionary: atoms do not overlap, a selected cell is consumed.
#[derive(Clone, Debug)]
pub struct Orthonormal {
    len: usize,
}

impl Orthonormal {
    pub fn new(layout: &GridLayout) -> Self {
        Self { len: layout.len() }
    }
}

impl Dictionary for Orthonormal {
    fn len(&self) -> usize {
        self.len
    }

    fn atom(&self, idx: usize) -> Vec<(usize, f64)> {
        vec![(idx, 1.0)]
    }

    fn atom_norm_sq(&self, _idx: usize) -> f64 {
        1.0
    }

    fn lipschitz(&self) -> f64 {
        1.0
    }

    fn synthesize(&self, coeffs: &[f64]) -> Vec<f64> {
        coeffs.to_vec()
    }

    fn analyze(&self, signal: &[f64]) -> Vec<f64> {
        signal.to_vec()
    }
}

/// Overlapping atoms: each cell leaks `leak · value` into its two time
/// neighbours on the same scale and frequency row.
#[derive(Clone, Debug)]
pub struct TimeLeakage {
    layout: GridLayout,
    leak: f64,
}

impl TimeLeakage {
    pub fn new(layout: &GridLayout, leak: f64) -> Result<Self> {
        if !(leak.is_finite() && (0.0..1.0).contains(&leak)) {
            return Err(WavegraphError::config(format!(
                "time leakage must lie in [0, 1), got {}",
                leak
            )));
        }
        Ok(Self {
            layout: layout.clone(),
            leak,
        })
    }
}

impl Dictionary for TimeLeakage {
    fn len(&self) -> usize {
        self.layout.len()
    }

    fn atom(&self, idx: usize) -> Vec<(usize, f64)> {
        let mut out = Vec::with_capacity(3);
        if let Some(prev) = self.layout.time_neighbour(idx, -1) {
            out.push((prev, self.leak));
        }
        out.push((idx, 1.0));
        if let Some(next) = self.layout.time_neighbour(idx, 1) {
            out.push((next, self.leak));
        }
        out
    }

    fn lipschitz(&self) -> f64 {
        // row sum of |DᵀD| for the symmetric kernel [l, 1, l]
        (1.0 + 2.0 * self.leak).powi(2)
    }
}

/// Closed set of dictionaries selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum DictionaryKind {
    #[default]
    Orthonormal,
    TimeLeakage {
        leak: f64,
    },
}

impl DictionaryKind {
    pub fn build(&self, layout: &GridLayout) -> Result<Box<dyn Dictionary>> {
        match *self {
            DictionaryKind::Orthonormal => Ok(Box::new(Orthonormal::new(layout))),
            DictionaryKind::TimeLeakage { leak } => Ok(Box::new(TimeLeakage::new(layout, leak)?)),
        }
    }
}
