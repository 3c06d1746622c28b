//! Sparse time-frequency decomposition of waveform templates and assembly
//! of the cross-template cluster graph.
//!
//! A [`tfmap::TimeFrequencyMap`] is decomposed by one of the selectors in
//! [`selector`] into a [`cluster::Cluster`]; clusters are persisted in a
//! [`store::ClusterStore`] and joined into a [`graph::Graph`] by
//! [`graph::GraphBuilder`].

pub mod cluster;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod graph;
pub mod grid;
pub mod pixel;
pub mod pixelgraph;
pub mod selector;
pub mod store;
pub mod template;
pub mod tfmap;

pub use cluster::{Cluster, ClusterMeta, Diagnostics, Method, StopReason};
pub use config::RunConfig;
pub use error::{Result, WavegraphError};
pub use graph::{Graph, GraphBuilder, GraphConfig, NodeId};
pub use pixel::{Axis, Pixel, PixelKey, PixelOrdering};
pub use selector::{DecompositionContext, PixelSelector, Selector};
pub use store::ClusterStore;
pub use template::{Alignment, TemplateId};
pub use tfmap::TimeFrequencyMap;

#[cfg(test)]
mod tests;

/// Initialize logging for tests
#[cfg(test)]
pub(crate) fn init() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
