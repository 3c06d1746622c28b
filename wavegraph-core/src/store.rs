//! Cluster persistence.
//!
//! One [`ClusterStore`] file holds every cluster of one batch (typically one
//! template, all shifts) together with a small header:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "description": "...",
//!   "params": { ... run configuration snapshot ... },
//!   "clusters": [ { "meta": {...}, "pixels": [...], "diagnostics": {...} } ]
//! }
//! ```
//!
//! Writes go through a temporary sibling file renamed into place, so readers
//! never observe a partially written store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::error::{Result, WavegraphError};

/// Version written into every store header.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// File extension of cluster stores.
pub const STORE_EXTENSION: &str = "json";

/// Persistent collection of clusters with provenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterStore {
    pub format_version: u32,
    pub description: String,
    /// Parameters the clusters were produced with.
    #[serde(default)]
    pub params: serde_json::Value,
    pub clusters: Vec<Cluster>,
}

impl ClusterStore {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: STORE_FORMAT_VERSION,
            description: description.into(),
            params: serde_json::Value::Null,
            clusters: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_clusters(mut self, clusters: Vec<Cluster>) -> Self {
        self.clusters = clusters;
        self
    }

    pub fn push(&mut self, cluster: Cluster) {
        self.clusters.push(cluster);
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Serialize to `path`, replacing any previous content atomically.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)?;
        info!(
            "Wrote {} clusters to {}",
            self.clusters.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a store, validating every cluster.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| WavegraphError::io(path, e))?;
        let store: ClusterStore = serde_json::from_slice(&bytes)
            .map_err(|e| WavegraphError::malformed(path, e.to_string()))?;
        if store.format_version != STORE_FORMAT_VERSION {
            return Err(WavegraphError::malformed(
                path,
                format!(
                    "unsupported format version {} (expected {})",
                    store.format_version, STORE_FORMAT_VERSION
                ),
            ));
        }
        debug!("Read {} clusters from {}", store.len(), path.display());
        Ok(store)
    }

    /// Load every `*.json` store in `dir`, in file-name order.
    pub fn read_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>> {
        store_files(dir)?.iter().map(Self::read).collect()
    }
}

/// Sorted paths of the store files in `dir`.
pub fn store_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| WavegraphError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| WavegraphError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == STORE_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Write `bytes` to a temporary sibling, then rename it onto `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| WavegraphError::config(format!("{} is not a file path", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(WavegraphError::io(path, e));
    }
    Ok(())
}
