//! Pixels, pixel keys and the configurable total order over them.
//!
//! A [`PixelOrdering`] is a sequence of [`Axis`] names. Comparison walks the
//! axes in sequence and falls through to the next one on equality. Orderings
//! are always completed to all three axes, so two distinct keys never compare
//! equal and the order persisted with a cluster is reproducible.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, WavegraphError};

/// Grid position of a pixel: (scale, time index, frequency index).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelKey {
    pub scale: u32,
    pub time: usize,
    pub freq: usize,
}

impl PixelKey {
    pub fn new(scale: u32, time: usize, freq: usize) -> Self {
        Self { scale, time, freq }
    }
}

impl fmt::Display for PixelKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(s={}, t={}, f={})", self.scale, self.time, self.freq)
    }
}

/// One selected coefficient of a time-frequency map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pixel {
    pub scale: u32,
    pub time: usize,
    pub freq: usize,
    /// Coefficient value found by the decomposition.
    pub value: f64,
    /// `|value|` divided by the L2 norm of all values of the owning cluster.
    pub amplitude: f64,
}

impl Pixel {
    pub fn key(&self) -> PixelKey {
        PixelKey::new(self.scale, self.time, self.freq)
    }
}

/// Axis of the time-frequency grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Scale,
    Time,
    Frequency,
}

impl Axis {
    pub fn name(&self) -> &'static str {
        match self {
            Axis::Scale => "scale",
            Axis::Time => "time",
            Axis::Frequency => "frequency",
        }
    }

    fn compare(&self, a: &PixelKey, b: &PixelKey) -> Ordering {
        match self {
            Axis::Scale => a.scale.cmp(&b.scale),
            Axis::Time => a.time.cmp(&b.time),
            Axis::Frequency => a.freq.cmp(&b.freq),
        }
    }
}

impl FromStr for Axis {
    type Err = WavegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scale" | "scale_index" => Ok(Axis::Scale),
            "time" | "time_index" => Ok(Axis::Time),
            "frequency" | "freq" | "freq_index" => Ok(Axis::Frequency),
            other => Err(WavegraphError::config(format!(
                "unknown ordering axis '{}' (expected scale, time or frequency)",
                other
            ))),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Completion order used when an ordering names fewer than three axes.
const COMPLETION: [Axis; 3] = [Axis::Frequency, Axis::Time, Axis::Scale];

/// Total order over pixels, given as a key sequence of axes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelOrdering {
    axes: [Axis; 3],
}

impl Default for PixelOrdering {
    /// Frequency-major, then time, then scale.
    fn default() -> Self {
        Self { axes: COMPLETION }
    }
}

impl PixelOrdering {
    /// Build an ordering from a key sequence. Axes not named are appended in
    /// frequency, time, scale order. Repeated axes are rejected.
    pub fn new(keys: &[Axis]) -> Result<Self> {
        if keys.len() > 3 {
            return Err(WavegraphError::config(format!(
                "ordering has {} axes, at most 3 allowed",
                keys.len()
            )));
        }
        let mut axes: Vec<Axis> = Vec::with_capacity(3);
        for axis in keys {
            if axes.contains(axis) {
                return Err(WavegraphError::config(format!(
                    "axis '{}' appears twice in ordering",
                    axis
                )));
            }
            axes.push(*axis);
        }
        for axis in COMPLETION {
            if !axes.contains(&axis) {
                axes.push(axis);
            }
        }
        Ok(Self {
            axes: [axes[0], axes[1], axes[2]],
        })
    }

    /// Parse axis names, e.g. `["frequency", "time"]`.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let keys = names
            .iter()
            .map(|n| n.as_ref().parse::<Axis>())
            .collect::<Result<Vec<_>>>()?;
        Self::new(&keys)
    }

    pub fn axes(&self) -> &[Axis; 3] {
        &self.axes
    }

    pub fn compare(&self, a: &PixelKey, b: &PixelKey) -> Ordering {
        for axis in &self.axes {
            match axis.compare(a, b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Sort pixels in place according to this ordering.
    pub fn sort(&self, pixels: &mut [Pixel]) {
        pixels.sort_by(|a, b| self.compare(&a.key(), &b.key()));
    }
}

impl fmt::Display for PixelOrdering {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self.axes.iter().map(|a| a.name()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl FromStr for PixelOrdering {
    type Err = WavegraphError;

    /// Comma or whitespace separated axis names.
    fn from_str(s: &str) -> Result<Self> {
        let names: Vec<&str> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|n| !n.is_empty())
            .collect();
        Self::parse(&names)
    }
}

impl Serialize for PixelOrdering {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let names: Vec<&str> = self.axes.iter().map(|a| a.name()).collect();
        names.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PixelOrdering {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            List(Vec<String>),
            Joined(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::List(names) => PixelOrdering::parse(&names),
            Repr::Joined(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// Fill in normalized amplitudes: `|value| / ||values||₂`.
pub fn normalise_amplitudes(pixels: &mut [Pixel]) {
    let norm = pixels.iter().map(|p| p.value * p.value).sum::<f64>().sqrt();
    for p in pixels.iter_mut() {
        p.amplitude = if norm > 0.0 {
            p.value.abs() / norm
        } else {
            0.0
        };
    }
}
