//! Start/end detection for adventure graphs.
//!
//! The start node is the first node (in input order) that no edge points
//! to; the end node is the first node that no edge leaves. When several
//! nodes qualify, the first one wins.

use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::models::{GraphEdge, GraphNode};

pub const NO_CLEAR_START_END: &str = "Graph has no clear start/end";

/// Returns `(start_node_id, end_node_id)` for the given graph.
pub fn validate(nodes: &[GraphNode], edges: &[GraphEdge]) -> AppResult<(String, String)> {
    if nodes.is_empty() {
        return Err(AppError::validation("Graph must contain at least one node"));
    }

    let mut node_ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !node_ids.insert(node.id.as_str()) {
            return Err(AppError::validation(format!(
                "Duplicate node id: {}",
                node.id
            )));
        }
    }

    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                return Err(AppError::validation(format!(
                    "Edge {} references unknown node {}",
                    edge.id, endpoint
                )));
            }
        }
    }

    let targets: HashSet<&str> = edges.iter().map(|e| e.target.as_str()).collect();
    let sources: HashSet<&str> = edges.iter().map(|e| e.source.as_str()).collect();

    let start = nodes.iter().find(|n| !targets.contains(n.id.as_str()));
    let end = nodes.iter().find(|n| !sources.contains(n.id.as_str()));

    match (start, end) {
        (Some(start), Some(end)) => Ok((start.id.clone(), end.id.clone())),
        _ => Err(AppError::validation(NO_CLEAR_START_END)),
    }
}
