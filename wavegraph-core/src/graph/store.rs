//! Edge-list text format for graphs.
//!
//! ```text
//! # wavegraph edge list
//! # meta: <free metadata line>
//! # nodes: 3
//! # node bank0:0 12
//! # node bank0:1 9
//! # node bank1:0 4
//! bank0:0 bank0:1 shared-pixel
//! bank0:1 bank1:0 adjacent-pixel
//! ```
//!
//! Metadata lines carry their own `meta:` prefix so free text never reads
//! as a structural line. Node lines carry the pixel count of each cluster. Edge lines list the
//! lower node id first; a graph without edges has only the header.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{Result, WavegraphError};
use crate::graph::{EdgeLabel, Graph, NodeId};
use crate::store::write_atomic;

const TITLE: &str = "wavegraph edge list";
const META: &str = "meta:";

/// Parsed or to-be-written edge list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeList {
    /// Free metadata lines, without the `# meta:` prefix.
    pub header: Vec<String>,
    /// Node ids with their pixel counts, in id order.
    pub nodes: Vec<(NodeId, usize)>,
    /// Canonical `(a, b, label)` triples with `a < b`, sorted.
    pub edges: Vec<(NodeId, NodeId, EdgeLabel)>,
}

impl EdgeList {
    pub fn from_graph(graph: &Graph, description: &str) -> Self {
        Self {
            header: description.lines().map(str::to_owned).collect(),
            nodes: graph
                .nodes()
                .iter()
                .map(|n| (n.id.clone(), n.cluster.len()))
                .collect(),
            edges: graph
                .edges()
                .iter()
                .map(|e| (e.a().clone(), e.b().clone(), e.label()))
                .collect(),
        }
    }

    pub fn edge_set(&self) -> BTreeSet<(NodeId, NodeId, EdgeLabel)> {
        self.edges.iter().cloned().collect()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = writeln!(out, "# {}", TITLE);
        for line in &self.header {
            let _ = writeln!(out, "# {} {}", META, line);
        }
        let _ = writeln!(out, "# nodes: {}", self.nodes.len());
        for (id, pixels) in &self.nodes {
            let _ = writeln!(out, "# node {} {}", id, pixels);
        }
        for (a, b, label) in &self.edges {
            let _ = writeln!(out, "{} {} {}", a, b, label);
        }
        out
    }

    /// Parse the text form; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let bad = |line: usize, reason: String| {
            WavegraphError::malformed(origin, format!("line {}: {}", line + 1, reason))
        };

        let mut list = EdgeList::default();
        let mut declared: Option<usize> = None;
        for (no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                let comment = comment.trim();
                if let Some(meta) = comment.strip_prefix(META) {
                    list.header.push(meta.trim_start().to_owned());
                } else if let Some(count) = comment.strip_prefix("nodes:") {
                    let count = count
                        .trim()
                        .parse::<usize>()
                        .map_err(|e| bad(no, format!("bad node count: {}", e)))?;
                    declared = Some(count);
                } else if let Some(node) = comment.strip_prefix("node ") {
                    let mut fields = node.split_whitespace();
                    let (Some(id), Some(pixels), None) = (fields.next(), fields.next(), fields.next())
                    else {
                        return Err(bad(no, format!("expected '# node <id> <pixels>', got '{}'", raw)));
                    };
                    let id: NodeId = id.parse().map_err(|e| bad(no, format!("{}", e)))?;
                    let pixels = pixels
                        .parse::<usize>()
                        .map_err(|e| bad(no, format!("bad pixel count: {}", e)))?;
                    list.nodes.push((id, pixels));
                }
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(a), Some(b), Some(label), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(bad(no, format!("expected '<a> <b> <label>', got '{}'", raw)));
            };
            let a: NodeId = a.parse().map_err(|e| bad(no, format!("{}", e)))?;
            let b: NodeId = b.parse().map_err(|e| bad(no, format!("{}", e)))?;
            let label: EdgeLabel = label.parse().map_err(|e| bad(no, format!("{}", e)))?;
            if a >= b {
                return Err(bad(no, format!("edge {} {} is not in canonical order", a, b)));
            }
            list.edges.push((a, b, label));
        }

        if let Some(count) = declared {
            if count != list.nodes.len() {
                return Err(WavegraphError::malformed(
                    origin,
                    format!("declares {} nodes but lists {}", count, list.nodes.len()),
                ));
            }
        }
        let known: HashSet<&NodeId> = list.nodes.iter().map(|(id, _)| id).collect();
        if known.len() != list.nodes.len() {
            return Err(WavegraphError::malformed(origin, "duplicate node id"));
        }
        let mut seen = HashSet::new();
        for (a, b, _) in &list.edges {
            if !known.is_empty() && !(known.contains(a) && known.contains(b)) {
                return Err(WavegraphError::malformed(
                    origin,
                    format!("edge {} {} references an undeclared node", a, b),
                ));
            }
            if !seen.insert((a, b)) {
                return Err(WavegraphError::malformed(
                    origin,
                    format!("duplicate edge {} {}", a, b),
                ));
            }
        }
        list.nodes.sort();
        list.edges.sort();
        Ok(list)
    }
}

/// Write `graph` as an edge list, atomically.
pub fn write_edge_list(path: impl AsRef<Path>, graph: &Graph, description: &str) -> Result<()> {
    let path = path.as_ref();
    let text = EdgeList::from_graph(graph, description).to_text();
    write_atomic(path, text.as_bytes())?;
    info!(
        "Wrote graph ({} nodes, {} edges) to {}",
        graph.node_count(),
        graph.edge_count(),
        path.display()
    );
    Ok(())
}

pub fn read_edge_list(path: impl AsRef<Path>) -> Result<EdgeList> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| WavegraphError::io(path, e))?;
    EdgeList::parse(&text, path)
}
