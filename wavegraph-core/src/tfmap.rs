//! Time-frequency coefficient maps produced by template generation.
//!
//! A [`TimeFrequencyMap`] holds one `DenseMatrix` plane per scale, shaped
//! `[n_freq, n_time]`. Decomposition works on a flat signal vector; the
//! [`GridLayout`] maps between flat indices and [`PixelKey`]s.
//!
//! Integrity rules checked on construction:
//! - one plane per scale of the grid, none empty
//! - every coefficient finite
//! - `n_time(s) · 2^s` identical across planes (same number of samples)
//! - that sample count matches `segment_duration · sample_rate` to within one bin

use log::{debug, trace};
use smartcore::linalg::basic::arrays::{Array, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{Result, WavegraphError};
use crate::grid::Grid;
use crate::pixel::PixelKey;
use crate::template::{Alignment, TemplateId};

/// Shape and flat offset of one scale plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneShape {
    pub scale: u32,
    pub n_freq: usize,
    pub n_time: usize,
    pub offset: usize,
}

impl PlaneShape {
    pub fn len(&self) -> usize {
        self.n_freq * self.n_time
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat indexing of all cells of a map, plane after plane, frequency rows
/// of `n_time` cells inside each plane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridLayout {
    planes: Vec<PlaneShape>,
    len: usize,
}

impl GridLayout {
    pub fn new(shapes: &[(u32, usize, usize)]) -> Self {
        let mut offset = 0;
        let planes = shapes
            .iter()
            .map(|&(scale, n_freq, n_time)| {
                let plane = PlaneShape {
                    scale,
                    n_freq,
                    n_time,
                    offset,
                };
                offset += n_freq * n_time;
                plane
            })
            .collect();
        Self {
            planes,
            len: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn planes(&self) -> &[PlaneShape] {
        &self.planes
    }

    pub fn plane(&self, scale: u32) -> Option<&PlaneShape> {
        self.planes.iter().find(|p| p.scale == scale)
    }

    pub fn index_of(&self, key: &PixelKey) -> Option<usize> {
        let plane = self.plane(key.scale)?;
        if key.freq >= plane.n_freq || key.time >= plane.n_time {
            return None;
        }
        Some(plane.offset + key.freq * plane.n_time + key.time)
    }

    pub fn key_of(&self, idx: usize) -> PixelKey {
        debug_assert!(idx < self.len, "flat index {} out of range", idx);
        // planes are laid out by increasing offset
        let p = self
            .planes
            .partition_point(|p| p.offset + p.len() <= idx)
            .min(self.planes.len() - 1);
        let plane = &self.planes[p];
        let local = idx - plane.offset;
        PixelKey::new(plane.scale, local % plane.n_time, local / plane.n_time)
    }

    /// Flat index of the time neighbour `dt` bins away on the same row.
    pub fn time_neighbour(&self, idx: usize, dt: isize) -> Option<usize> {
        let key = self.key_of(idx);
        let plane = self.plane(key.scale)?;
        let t = key.time as isize + dt;
        if t < 0 || t >= plane.n_time as isize {
            return None;
        }
        Some((idx as isize + dt) as usize)
    }
}

/// Coefficient grid of one template, one plane per scale.
#[derive(Clone, Debug)]
pub struct TimeFrequencyMap {
    template: TemplateId,
    grid: Grid,
    segment_duration: f64,
    planes: Vec<DenseMatrix<f64>>,
}

impl TimeFrequencyMap {
    /// Build and validate a map. `planes[i]` belongs to scale `min_scale + i`.
    pub fn new(
        template: TemplateId,
        sample_rate: f64,
        segment_duration: f64,
        min_scale: u32,
        max_scale: u32,
        planes: Vec<DenseMatrix<f64>>,
    ) -> Result<Self> {
        let grid = Grid::new(sample_rate, min_scale, max_scale)
            .map_err(|e| WavegraphError::integrity(e.to_string()))?;
        let map = Self {
            template,
            grid,
            segment_duration,
            planes,
        };
        map.validate()?;
        Ok(map)
    }

    /// All-zero map with `n_freq` frequency rows per plane and as many time
    /// bins per plane as `segment_duration · sample_rate / 2^s`.
    pub fn zeros(
        template: TemplateId,
        sample_rate: f64,
        segment_duration: f64,
        min_scale: u32,
        max_scale: u32,
        n_freq: usize,
    ) -> Result<Self> {
        let samples = (segment_duration * sample_rate).round();
        if !(samples.is_finite() && samples >= 1.0) {
            return Err(WavegraphError::integrity(format!(
                "segment of {} s at {} Hz holds no samples",
                segment_duration, sample_rate
            )));
        }
        let samples = samples as usize;
        let planes = (min_scale..=max_scale)
            .map(|s| {
                let n_time = samples >> s;
                zero_plane(n_freq, n_time)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(
            template,
            sample_rate,
            segment_duration,
            min_scale,
            max_scale,
            planes,
        )
    }

    fn validate(&self) -> Result<()> {
        if !(self.segment_duration.is_finite() && self.segment_duration > 0.0) {
            return Err(WavegraphError::integrity(format!(
                "template {}: segment duration must be positive, got {}",
                self.template, self.segment_duration
            )));
        }
        if self.planes.len() != self.grid.num_scales() {
            return Err(WavegraphError::integrity(format!(
                "template {}: {} planes for scales {}..={}",
                self.template,
                self.planes.len(),
                self.grid.min_scale,
                self.grid.max_scale
            )));
        }

        let expected = self.segment_duration * self.grid.sampling_freq;
        for (scale, plane) in self.grid.scales().zip(&self.planes) {
            let (n_freq, n_time) = plane.shape();
            if n_freq == 0 || n_time == 0 {
                return Err(WavegraphError::integrity(format!(
                    "template {}: plane at scale {} is empty",
                    self.template, scale
                )));
            }
            let covered = (n_time as u64) << scale;
            if (covered as f64 - expected).abs() >= (1u64 << scale) as f64 {
                return Err(WavegraphError::integrity(format!(
                    "template {}: plane at scale {} covers {} samples, segment holds {}",
                    self.template, scale, covered, expected
                )));
            }
            for f in 0..n_freq {
                for t in 0..n_time {
                    if !plane.get((f, t)).is_finite() {
                        return Err(WavegraphError::integrity(format!(
                            "template {}: non-finite coefficient at (s={}, t={}, f={})",
                            self.template, scale, t, f
                        )));
                    }
                }
            }
        }
        trace!(
            "validated map for template {} ({} planes)",
            self.template,
            self.planes.len()
        );
        Ok(())
    }

    pub fn template(&self) -> &TemplateId {
        &self.template
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn sample_rate(&self) -> f64 {
        self.grid.sampling_freq
    }

    pub fn segment_duration(&self) -> f64 {
        self.segment_duration
    }

    pub fn min_scale(&self) -> u32 {
        self.grid.min_scale
    }

    pub fn max_scale(&self) -> u32 {
        self.grid.max_scale
    }

    pub fn plane(&self, scale: u32) -> Option<&DenseMatrix<f64>> {
        if !self.grid.contains_scale(scale) {
            return None;
        }
        self.planes.get((scale - self.grid.min_scale) as usize)
    }

    pub fn get(&self, key: &PixelKey) -> Option<f64> {
        let plane = self.plane(key.scale)?;
        let (n_freq, n_time) = plane.shape();
        if key.freq >= n_freq || key.time >= n_time {
            return None;
        }
        Some(*plane.get((key.freq, key.time)))
    }

    /// Overwrite one coefficient.
    pub fn set(&mut self, key: &PixelKey, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(WavegraphError::integrity(format!(
                "non-finite coefficient {} at {}",
                value, key
            )));
        }
        let min_scale = self.grid.min_scale;
        let plane = self
            .grid
            .contains_scale(key.scale)
            .then(|| self.planes.get_mut((key.scale - min_scale) as usize))
            .flatten()
            .ok_or_else(|| WavegraphError::integrity(format!("scale of {} not in map", key)))?;
        let (n_freq, n_time) = plane.shape();
        if key.freq >= n_freq || key.time >= n_time {
            return Err(WavegraphError::integrity(format!(
                "{} outside plane of shape [{}, {}]",
                key, n_freq, n_time
            )));
        }
        plane.set((key.freq, key.time), value);
        Ok(())
    }

    pub fn layout(&self) -> GridLayout {
        let shapes: Vec<(u32, usize, usize)> = self
            .grid
            .scales()
            .zip(&self.planes)
            .map(|(s, p)| {
                let (n_freq, n_time) = p.shape();
                (s, n_freq, n_time)
            })
            .collect();
        GridLayout::new(&shapes)
    }

    /// Flatten all planes following [`GridLayout`].
    pub fn to_signal(&self) -> Vec<f64> {
        let layout = self.layout();
        let mut out = Vec::with_capacity(layout.len());
        for plane in &self.planes {
            let (n_freq, n_time) = plane.shape();
            for f in 0..n_freq {
                for t in 0..n_time {
                    out.push(*plane.get((f, t)));
                }
            }
        }
        out
    }

    /// Sub-map restricted to scales `min..=max`.
    pub fn restrict_scales(&self, min_scale: u32, max_scale: u32) -> Result<Self> {
        if max_scale < min_scale {
            return Err(WavegraphError::config(format!(
                "max_scale ({}) < min_scale ({})",
                max_scale, min_scale
            )));
        }
        if !(self.grid.contains_scale(min_scale) && self.grid.contains_scale(max_scale)) {
            return Err(WavegraphError::integrity(format!(
                "template {}: scales {}..={} not covered by map scales {}..={}",
                self.template, min_scale, max_scale, self.grid.min_scale, self.grid.max_scale
            )));
        }
        if min_scale == self.grid.min_scale && max_scale == self.grid.max_scale {
            return Ok(self.clone());
        }
        let lo = (min_scale - self.grid.min_scale) as usize;
        let hi = (max_scale - self.grid.min_scale) as usize;
        Self::new(
            self.template.clone(),
            self.grid.sampling_freq,
            self.segment_duration,
            min_scale,
            max_scale,
            self.planes[lo..=hi].to_vec(),
        )
    }

    /// Total energy `Σ value²` over all planes.
    pub fn energy(&self) -> f64 {
        self.to_signal().iter().map(|v| v * v).sum()
    }

    /// Copy of the map moved by `shift` units of the largest scale.
    ///
    /// Plane `s` moves by `shift · 2^(max_scale − s)` bins in the direction
    /// given by `alignment`; vacated bins are zero and content pushed past
    /// the segment edge is dropped.
    pub fn time_shifted(&self, shift: usize, alignment: Alignment) -> Result<Self> {
        if shift == 0 {
            return Ok(self.clone());
        }
        let direction = alignment.shift_direction();
        let mut dropped = 0.0;
        let mut planes = Vec::with_capacity(self.planes.len());
        for (scale, plane) in self.grid.scales().zip(&self.planes) {
            let (n_freq, n_time) = plane.shape();
            let bins = shift << (self.grid.max_scale - scale);
            let delta = direction * bins as isize;
            let mut shifted = zero_plane(n_freq, n_time)?;
            for f in 0..n_freq {
                for t in 0..n_time {
                    let v = *plane.get((f, t));
                    let dest = t as isize + delta;
                    if dest >= 0 && (dest as usize) < n_time {
                        shifted.set((f, dest as usize), v);
                    } else {
                        dropped += v * v;
                    }
                }
            }
            planes.push(shifted);
        }
        if dropped > 0.0 {
            debug!(
                "template {}: time shift {} drops energy {:.3e} past the segment edge",
                self.template, shift, dropped
            );
        }
        Self::new(
            self.template.clone(),
            self.grid.sampling_freq,
            self.segment_duration,
            self.grid.min_scale,
            self.grid.max_scale,
            planes,
        )
    }
}

fn zero_plane(n_freq: usize, n_time: usize) -> Result<DenseMatrix<f64>> {
    DenseMatrix::new(n_freq, n_time, vec![0.0; n_freq * n_time], false)
        .map_err(|e| WavegraphError::integrity(format!("cannot allocate plane: {}", e)))
}
