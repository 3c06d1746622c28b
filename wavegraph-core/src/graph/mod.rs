//! Cross-template cluster graph.
//!
//! Nodes are clusters identified by (template, time-shift). Edges are
//! unordered and labelled with the strongest relation that links the two
//! clusters. The graph is built once by [`GraphBuilder`] and never mutated.

pub mod builder;
pub mod store;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

use crate::cluster::Cluster;
use crate::error::{Result, WavegraphError};
use crate::template::TemplateId;

pub use builder::{pixels_adjacent, AdjacencyTolerance, GraphBuilder, GraphConfig};
pub use store::{read_edge_list, write_edge_list, EdgeList};

/// Stable node identifier, ordered by template id then shift.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub template: TemplateId,
    pub time_shift: usize,
}

impl NodeId {
    pub fn new(template: TemplateId, time_shift: usize) -> Self {
        Self {
            template,
            time_shift,
        }
    }

    pub fn of(cluster: &Cluster) -> Self {
        Self::new(cluster.template().clone(), cluster.time_shift())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.template, self.time_shift)
    }
}

impl FromStr for NodeId {
    type Err = WavegraphError;

    /// Parses `<template>:<shift>`.
    fn from_str(s: &str) -> Result<Self> {
        let (template, shift) = s
            .rsplit_once(':')
            .ok_or_else(|| WavegraphError::config(format!("node id '{}' lacks ':<shift>'", s)))?;
        let time_shift = shift
            .parse::<usize>()
            .map_err(|e| WavegraphError::config(format!("node id '{}': bad shift: {}", s, e)))?;
        Ok(Self::new(template.parse()?, time_shift))
    }
}

/// Relation that justified an edge. Variants are ordered by strength.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeLabel {
    /// Same template, consecutive time-shift indices.
    AdjacentShift,
    /// Pixels within the adjacency tolerance but no identical triple.
    AdjacentPixel,
    /// At least one identical (scale, time, frequency) triple.
    SharedPixel,
}

impl EdgeLabel {
    pub fn name(&self) -> &'static str {
        match self {
            EdgeLabel::AdjacentShift => "adjacent-shift",
            EdgeLabel::AdjacentPixel => "adjacent-pixel",
            EdgeLabel::SharedPixel => "shared-pixel",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EdgeLabel {
    type Err = WavegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "adjacent-shift" => Ok(EdgeLabel::AdjacentShift),
            "adjacent-pixel" => Ok(EdgeLabel::AdjacentPixel),
            "shared-pixel" => Ok(EdgeLabel::SharedPixel),
            other => Err(WavegraphError::config(format!("unknown edge label '{}'", other))),
        }
    }
}

/// A cluster as a graph vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub cluster: Cluster,
}

/// Unordered labelled pair, stored with `a < b`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphEdge {
    a: NodeId,
    b: NodeId,
    label: EdgeLabel,
}

impl GraphEdge {
    /// Canonicalize the pair; self-loops are rejected.
    pub fn new(x: NodeId, y: NodeId, label: EdgeLabel) -> Result<Self> {
        if x == y {
            return Err(WavegraphError::integrity(format!("self-loop on node {}", x)));
        }
        let (a, b) = if x < y { (x, y) } else { (y, x) };
        Ok(Self { a, b, label })
    }

    pub fn a(&self) -> &NodeId {
        &self.a
    }

    pub fn b(&self) -> &NodeId {
        &self.b
    }

    pub fn label(&self) -> EdgeLabel {
        self.label
    }

    pub fn touches(&self, id: &NodeId) -> bool {
        &self.a == id || &self.b == id
    }
}

/// Static node and edge sets of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl Graph {
    /// `nodes` must be sorted by id and unique; `edges` sorted and unique.
    pub(crate) fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        debug_assert!(nodes.windows(2).all(|w| w[0].id < w[1].id));
        debug_assert!(edges.windows(2).all(|w| (&w[0].a, &w[0].b) < (&w[1].a, &w[1].b)));
        Self { nodes, edges }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes
            .binary_search_by(|n| n.id.cmp(id))
            .ok()
            .map(|i| &self.nodes[i])
    }

    pub fn edge(&self, x: &NodeId, y: &NodeId) -> Option<&GraphEdge> {
        let (a, b) = if x < y { (x, y) } else { (y, x) };
        self.edges
            .binary_search_by(|e| (&e.a, &e.b).cmp(&(a, b)))
            .ok()
            .map(|i| &self.edges[i])
    }

    pub fn neighbours<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges.iter().filter_map(move |e| {
            if &e.a == id {
                Some(&e.b)
            } else if &e.b == id {
                Some(&e.a)
            } else {
                None
            }
        })
    }

    pub fn degree(&self, id: &NodeId) -> usize {
        self.edges.iter().filter(|e| e.touches(id)).count()
    }

    /// Edges as a set of unordered labelled pairs.
    pub fn edge_set(&self) -> BTreeSet<(NodeId, NodeId, EdgeLabel)> {
        self.edges
            .iter()
            .map(|e| (e.a.clone(), e.b.clone(), e.label))
            .collect()
    }

    /// Symmetric 0/1 adjacency matrix in node order.
    pub fn adjacency_matrix(&self) -> CsMat<f64> {
        let n = self.nodes.len();
        let mut triplets = TriMat::new((n, n));
        for e in &self.edges {
            // both ids exist by construction
            if let (Ok(i), Ok(j)) = (
                self.nodes.binary_search_by(|n| n.id.cmp(&e.a)),
                self.nodes.binary_search_by(|n| n.id.cmp(&e.b)),
            ) {
                triplets.add_triplet(i, j, 1.0);
                triplets.add_triplet(j, i, 1.0);
            }
        }
        triplets.to_csr()
    }
}
