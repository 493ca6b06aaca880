//! # Graph Serialization
//!
//! A portable link-node JSON document:
//!
//! ```json
//! { "nodes": [ { "id": "<uuid>", "kind": "<tag>", ... }, ... ],
//!   "links": [ { "source": "<uuid>", "target": "<uuid>" }, ... ] }
//! ```
//!
//! This is the engine's only externally consumed format — a single JSON
//! shape, no separate binary canonical export. Deserializing bypasses
//! deref/versioning entirely: nodes are loaded exactly as authored,
//! including shadowed variable versions — the graph algebra's invariants
//! are a property of how a graph is *built*, not a property `from_record`
//! re-derives.

use crate::error::IrError;
use crate::id::NodeId;
use crate::instruction::Node;
use crate::limits::{MAX_IMPORT_LINK_COUNT, MAX_IMPORT_NODE_COUNT};
use crate::store::{DiGraph, Store};
use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value;

/// One entry of the document's `"nodes"` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: String,
    #[serde(flatten)]
    pub attrs: JsonMap<String, Value>,
}

/// One entry of the document's `"links"` array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkRecord {
    pub source: NodeId,
    pub target: NodeId,
}

/// The full transport document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphRecord {
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
}

/// Emit a [`GraphRecord`] for every node and edge of `store`, in id order —
/// determinism follows directly from `store`'s `BTreeMap` storage.
#[must_use]
pub fn to_record<S: Store>(store: &S) -> GraphRecord {
    let mut nodes: Vec<NodeRecord> = store.nodes().into_iter().map(Node::to_record).collect();
    nodes.sort_by_key(|n| n.id);

    let mut links: Vec<LinkRecord> = store
        .edges()
        .into_iter()
        .map(|(source, target)| LinkRecord { source, target })
        .collect();
    links.sort();

    GraphRecord { nodes, links }
}

/// Rebuild a [`DiGraph`] from a [`GraphRecord`], bypassing the graph
/// algebra entirely (no singleton dedup, no deref, no re-versioning).
///
/// Fails with `InvalidSerializedGraph` if any link endpoint is absent after
/// all nodes are loaded, or if the document exceeds the configured import
/// size bounds.
pub fn from_record(record: &GraphRecord) -> Result<DiGraph, IrError> {
    if record.nodes.len() > MAX_IMPORT_NODE_COUNT {
        return Err(IrError::InvalidSerializedGraph(format!(
            "node count {} exceeds limit {MAX_IMPORT_NODE_COUNT}",
            record.nodes.len()
        )));
    }
    if record.links.len() > MAX_IMPORT_LINK_COUNT {
        return Err(IrError::InvalidSerializedGraph(format!(
            "link count {} exceeds limit {MAX_IMPORT_LINK_COUNT}",
            record.links.len()
        )));
    }

    let mut graph = DiGraph::new();
    for node_record in &record.nodes {
        let node = Node::from_record(node_record).map_err(|e| {
            IrError::InvalidSerializedGraph(format!("node {}: {e}", node_record.id))
        })?;
        graph.add_node(node);
    }

    for link in &record.links {
        graph.add_edge(link.source, link.target).map_err(|_| {
            IrError::InvalidSerializedGraph(format!(
                "link {} -> {} references an undefined node",
                link.source, link.target
            ))
        })?;
    }

    Ok(graph)
}

/// Convenience: serialize straight to a JSON string.
pub fn to_json<S: Store>(store: &S) -> Result<String, IrError> {
    serde_json::to_string(&to_record(store))
        .map_err(|e| IrError::InvalidSerializedGraph(e.to_string()))
}

/// Convenience: parse a JSON string and rebuild a [`DiGraph`].
pub fn from_json(json: &str) -> Result<DiGraph, IrError> {
    let record: GraphRecord =
        serde_json::from_str(json).map_err(|e| IrError::InvalidSerializedGraph(e.to_string()))?;
    from_record(&record)
}
