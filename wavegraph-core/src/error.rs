//! Error types for wavegraph.

use std::path::PathBuf;

use thiserror::Error;

/// Wavegraph error types.
///
/// Convergence problems are not errors: a selector that runs out of
/// iterations still returns its best cluster and flags it through
/// [`crate::cluster::Diagnostics`].
#[derive(Error, Debug)]
pub enum WavegraphError {
    /// Invalid or mutually inconsistent parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input data is missing required fields or is inconsistent.
    #[error("input integrity error: {0}")]
    InputIntegrity(String),

    /// Filesystem failure while reading or writing an artifact.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An artifact could be read but its content is not valid.
    #[error("malformed artifact {path}: {reason}")]
    MalformedArtifact { path: PathBuf, reason: String },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl WavegraphError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        WavegraphError::Configuration(msg.into())
    }

    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        WavegraphError::InputIntegrity(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WavegraphError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        WavegraphError::MalformedArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for wavegraph operations.
pub type Result<T> = std::result::Result<T, WavegraphError>;
