//! Time-frequency-scale grid of the wavelet transform.
//!
//! Scales are exponents: the plane at scale `s` has a timescale of
//! `2^s / fs` seconds and a frequency resolution of `1 / (2 · timescale)`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WavegraphError};
use crate::pixel::{Pixel, PixelKey};

/// Physical coordinates of a grid point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysCoords {
    /// Scale exponent.
    pub scale: u32,
    /// Seconds from the segment start.
    pub time: f64,
    /// Hertz.
    pub frequency: f64,
}

/// Sampling frequency plus an inclusive range of scale exponents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub sampling_freq: f64,
    pub min_scale: u32,
    pub max_scale: u32,
}

impl Grid {
    pub fn new(sampling_freq: f64, min_scale: u32, max_scale: u32) -> Result<Self> {
        if !(sampling_freq.is_finite() && sampling_freq > 0.0) {
            return Err(WavegraphError::config(format!(
                "sampling frequency must be positive, got {}",
                sampling_freq
            )));
        }
        if max_scale < min_scale {
            return Err(WavegraphError::config(format!(
                "max_scale ({}) < min_scale ({})",
                max_scale, min_scale
            )));
        }
        if max_scale >= 63 {
            return Err(WavegraphError::config(format!(
                "max_scale {} is out of range",
                max_scale
            )));
        }
        Ok(Self {
            sampling_freq,
            min_scale,
            max_scale,
        })
    }

    pub fn num_scales(&self) -> usize {
        (self.max_scale - self.min_scale + 1) as usize
    }

    pub fn scales(&self) -> impl Iterator<Item = u32> {
        self.min_scale..=self.max_scale
    }

    pub fn contains_scale(&self, scale: u32) -> bool {
        (self.min_scale..=self.max_scale).contains(&scale)
    }

    /// Timescale in seconds of the plane at `scale`.
    pub fn timescale(&self, scale: u32) -> f64 {
        (1u64 << scale) as f64 / self.sampling_freq
    }

    pub fn timescale_min(&self) -> f64 {
        self.timescale(self.min_scale)
    }

    pub fn timescale_max(&self) -> f64 {
        self.timescale(self.max_scale)
    }

    pub fn phys_coords(&self, key: &PixelKey) -> PhysCoords {
        let tau = self.timescale(key.scale);
        PhysCoords {
            scale: key.scale,
            time: key.time as f64 * tau,
            frequency: key.freq as f64 / (2.0 * tau),
        }
    }

    /// Nearest grid point for physical coordinates, `None` if the timescale
    /// is not one of the grid planes.
    pub fn key_from_phys(&self, timescale: f64, time: f64, frequency: f64) -> Option<PixelKey> {
        let scale = self
            .scales()
            .find(|&s| (self.timescale(s) - timescale).abs() <= 1e-12 * timescale.abs())?;
        if time < 0.0 || frequency < 0.0 {
            return None;
        }
        let tau = self.timescale(scale);
        Some(PixelKey::new(
            scale,
            (time / tau).round() as usize,
            (2.0 * frequency * tau).round() as usize,
        ))
    }

    /// Pixel value expressed as a physical amplitude: `sqrt(value · timescale)`.
    pub fn phys_value(&self, pixel: &Pixel) -> f64 {
        (pixel.value * self.timescale(pixel.scale)).sqrt()
    }
}
