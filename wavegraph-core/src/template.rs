//! Template identity and waveform alignment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, WavegraphError};

/// Opaque template identifier.
///
/// Used verbatim in graph node ids and edge lists, so it must be non-empty and
/// may not contain whitespace or `:`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(WavegraphError::config("template id is empty"));
        }
        if id.chars().any(|c| c.is_whitespace() || c == ':') {
            return Err(WavegraphError::config(format!(
                "template id '{}' contains whitespace or ':'",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TemplateId {
    type Err = WavegraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TemplateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TemplateId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Where the waveform support is anchored inside its analysis segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Right,
    Center,
}

impl Alignment {
    /// Direction of time shifts: `-1` toward the segment start, `+1` toward
    /// its end. A right-anchored waveform can only move toward the start.
    pub fn shift_direction(&self) -> isize {
        match self {
            Alignment::Left => 1,
            Alignment::Right | Alignment::Center => -1,
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Alignment::Left => write!(f, "left"),
            Alignment::Right => write!(f, "right"),
            Alignment::Center => write!(f, "center"),
        }
    }
}

impl FromStr for Alignment {
    type Err = WavegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "right" => Ok(Alignment::Right),
            "center" | "centre" => Ok(Alignment::Center),
            other => Err(WavegraphError::config(format!(
                "unknown waveform alignment '{}'",
                other
            ))),
        }
    }
}
