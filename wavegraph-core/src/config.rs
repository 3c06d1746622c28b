//! Run configuration.
//!
//! [`RunConfig`] is the parsing boundary for everything a batch run needs:
//! method selection, grid and segment settings, per-method tolerances and the
//! graph adjacency policy. Loose input forms are normalized here so the rest
//! of the crate only sees typed values:
//! - booleans may be written `true`, `"True"`, `"false"`, `"1"`, `0`, ...
//! - the ordering may be a list of axis names or one comma-separated string
//! - the method name is case-insensitive
//!
//! Unknown keys are rejected.
//!
//! ```json
//! {
//!   "method": "iniht",
//!   "segment-duration": 1.0,
//!   "waveform-alignment": "right",
//!   "min-scale": 4,
//!   "max-scale": 6,
//!   "num-time-shift": 8,
//!   "reject-pixels-at-zero-freq": "True",
//!   "ordering": "frequency,time",
//!   "start-pixels": 5,
//!   "kappa": 1.5
//! }
//! ```

use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::cluster::Method;
use crate::dictionary::DictionaryKind;
use crate::error::{Result, WavegraphError};
use crate::graph::{AdjacencyTolerance, GraphConfig};
use crate::pixel::PixelOrdering;
use crate::selector::{
    Cbpdn, CbpdnParams, DecompositionContext, Iniht, InihtParams, MatchingPursuit,
    MatchingPursuitParams, PixelSelector, Selector, SolverKind,
};
use crate::template::Alignment;

fn default_true() -> bool {
    true
}

fn default_shifts() -> usize {
    1
}

/// Accepts JSON booleans, integers 0/1 and the strings true/false/1/0 in
/// any case.
fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Bool(b) => Ok(b),
        Repr::Int(0) => Ok(false),
        Repr::Int(1) => Ok(true),
        Repr::Int(other) => Err(serde::de::Error::custom(format!(
            "expected a boolean, got {}",
            other
        ))),
        Repr::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got '{}'",
                other
            ))),
        },
    }
}

fn flexible_opt_bool<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error> {
    flexible_bool(deserializer).map(Some)
}

fn method_name<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Method, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn alignment_name<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Alignment, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// Everything a batch run is configured with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunConfig {
    #[serde(deserialize_with = "method_name")]
    pub method: Method,
    /// Seconds of signal covered by each map.
    pub segment_duration: f64,
    #[serde(default, deserialize_with = "alignment_name")]
    pub waveform_alignment: Alignment,
    pub min_scale: u32,
    pub max_scale: u32,
    /// Number of time shifts decomposed per template.
    #[serde(default = "default_shifts", alias = "num-time-shifts")]
    pub num_time_shift: usize,
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub reject_pixels_at_zero_freq: bool,
    #[serde(default)]
    pub ordering: PixelOrdering,
    #[serde(default)]
    pub dictionary: DictionaryKind,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub verbose: bool,

    // Tolerances shared by several methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approx_error: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kappa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_threshold: Option<f64>,

    // Matching pursuit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pixels: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_floor: Option<f64>,

    // INIHT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_pixels: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_pixels: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<f64>,

    // CBPDN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_diff: Option<f64>,
    #[serde(
        default,
        deserialize_with = "flexible_opt_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub debias: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverKind>,

    // Graph assembly.
    #[serde(default)]
    pub adjacency: AdjacencyTolerance,
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub link_adjacent_shifts: bool,
}

impl RunConfig {
    /// Minimal configuration with defaults for everything optional.
    pub fn new(method: Method, segment_duration: f64, min_scale: u32, max_scale: u32) -> Self {
        Self {
            method,
            segment_duration,
            waveform_alignment: Alignment::default(),
            min_scale,
            max_scale,
            num_time_shift: default_shifts(),
            reject_pixels_at_zero_freq: true,
            ordering: PixelOrdering::default(),
            dictionary: DictionaryKind::default(),
            verbose: false,
            approx_error: None,
            max_iterations: None,
            kappa: None,
            cv_threshold: None,
            max_pixels: None,
            noise_floor: None,
            start_pixels: None,
            step_pixels: None,
            c: None,
            gamma: None,
            cv_diff: None,
            debias: None,
            solver: None,
            adjacency: AdjacencyTolerance::default(),
            link_adjacent_shifts: true,
        }
    }

    /// Parse and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json)
            .map_err(|e| WavegraphError::config(format!("invalid run configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| WavegraphError::io(path, e))?;
        let config = Self::from_json_str(&json)?;
        debug!("Loaded run configuration from {}", path.display());
        Ok(config)
    }

    /// JSON snapshot stored alongside produced artifacts.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Cross-field checks, including the selected method's parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.segment_duration.is_finite() && self.segment_duration > 0.0) {
            return Err(WavegraphError::config(format!(
                "segment-duration must be positive, got {}",
                self.segment_duration
            )));
        }
        if self.max_scale < self.min_scale {
            return Err(WavegraphError::config(format!(
                "max-scale ({}) < min-scale ({})",
                self.max_scale, self.min_scale
            )));
        }
        if self.max_scale >= 63 {
            return Err(WavegraphError::config(format!(
                "max-scale {} is too large",
                self.max_scale
            )));
        }
        if self.num_time_shift == 0 {
            return Err(WavegraphError::config("num-time-shift must be at least 1"));
        }
        if let DictionaryKind::TimeLeakage { leak } = self.dictionary {
            if !(0.0..1.0).contains(&leak) {
                return Err(WavegraphError::config(format!(
                    "time-leakage factor must lie in [0, 1), got {}",
                    leak
                )));
            }
        }
        self.warn_unused();
        self.selector().validate()
    }

    fn warn_unused(&self) {
        let unused: Vec<(&str, bool)> = match self.method {
            Method::MatchingPursuit => vec![
                ("start-pixels", self.start_pixels.is_some()),
                ("step-pixels", self.step_pixels.is_some()),
                ("c", self.c.is_some()),
                ("gamma", self.gamma.is_some()),
                ("kappa", self.kappa.is_some()),
                ("cv-threshold", self.cv_threshold.is_some()),
                ("cv-diff", self.cv_diff.is_some()),
                ("debias", self.debias.is_some()),
                ("solver", self.solver.is_some()),
            ],
            Method::Iniht => vec![
                ("max-pixels", self.max_pixels.is_some()),
                ("noise-floor", self.noise_floor.is_some()),
                ("gamma", self.gamma.is_some()),
                ("cv-diff", self.cv_diff.is_some()),
                ("debias", self.debias.is_some()),
                ("solver", self.solver.is_some()),
            ],
            Method::Cbpdn => vec![
                ("max-pixels", self.max_pixels.is_some()),
                ("noise-floor", self.noise_floor.is_some()),
                ("start-pixels", self.start_pixels.is_some()),
                ("step-pixels", self.step_pixels.is_some()),
                ("c", self.c.is_some()),
            ],
        };
        for (name, set) in unused {
            if set {
                warn!("parameter '{}' is ignored by method {}", name, self.method);
            }
        }
    }

    /// Selector for the configured method; unset parameters keep the
    /// method's defaults.
    pub fn selector(&self) -> Selector {
        match self.method {
            Method::MatchingPursuit => {
                let d = MatchingPursuitParams::default();
                MatchingPursuit::new(MatchingPursuitParams {
                    max_pixels: self.max_pixels.or(d.max_pixels),
                    approx_error: self.approx_error.or(d.approx_error),
                    noise_floor: self.noise_floor.unwrap_or(d.noise_floor),
                    max_iterations: self.max_iterations.or(d.max_iterations),
                })
                .into()
            }
            Method::Iniht => {
                let d = InihtParams::default();
                Iniht::new(InihtParams {
                    start_pixels: self.start_pixels.unwrap_or(d.start_pixels),
                    step_pixels: self.step_pixels.unwrap_or(d.step_pixels),
                    c: self.c.unwrap_or(d.c),
                    kappa: self.kappa.unwrap_or(d.kappa),
                    cv_threshold: self.cv_threshold.unwrap_or(d.cv_threshold),
                    approx_error: self.approx_error.or(d.approx_error),
                    max_iterations: self.max_iterations.unwrap_or(d.max_iterations),
                })
                .into()
            }
            Method::Cbpdn => {
                let d = CbpdnParams::default();
                Cbpdn::new(CbpdnParams {
                    gamma: self.gamma.unwrap_or(d.gamma),
                    kappa: self.kappa.unwrap_or(d.kappa),
                    approx_error: self.approx_error.or(d.approx_error),
                    cv_threshold: self.cv_threshold.unwrap_or(d.cv_threshold),
                    cv_diff: self.cv_diff.unwrap_or(d.cv_diff),
                    max_iterations: self.max_iterations.unwrap_or(d.max_iterations),
                    debias: self.debias.unwrap_or(d.debias),
                    solver: self.solver.unwrap_or(d.solver),
                })
                .into()
            }
        }
    }

    /// Decomposition context for one time shift.
    pub fn context(&self, time_shift: usize) -> DecompositionContext {
        DecompositionContext {
            time_shift,
            alignment: self.waveform_alignment,
            ordering: self.ordering.clone(),
            reject_zero_freq: self.reject_pixels_at_zero_freq,
            scale_range: Some((self.min_scale, self.max_scale)),
            dictionary: self.dictionary,
            verbose: self.verbose,
        }
    }

    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            tolerance: self.adjacency,
            link_adjacent_shifts: self.link_adjacent_shifts,
        }
    }
}
