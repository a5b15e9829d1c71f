//! Read views over the graph: the live state and historical projections.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::history::{HistoryLog, Revision};
use super::{Edge, Node};
use crate::types::{Identifier, Timestamp};

/// Read access shared by the live graph and historical projections.
///
/// A live view holds exactly one revision per entity. A projection over an
/// interval may hold several revisions of the same entity; they are
/// returned oldest first.
pub trait GraphView {
    /// Time window covered by the view; the live view spans everything.
    fn window(&self) -> (Timestamp, Timestamp);

    /// Returns true for the live view.
    fn is_live(&self) -> bool;

    /// Every visible node revision, ordered by identifier.
    fn nodes(&self) -> Vec<Arc<Node>>;

    /// Visible revisions of one node.
    fn node_revisions(&self, id: &Identifier) -> Vec<Arc<Node>>;

    /// Every visible edge revision, ordered by identifier.
    fn edges(&self) -> Vec<Arc<Edge>>;

    /// Visible revisions of one edge.
    fn edge_revisions(&self, id: &Identifier) -> Vec<Arc<Edge>>;

    /// Edges whose parent is `node`, in creation order. One revision per
    /// edge: the most recent visible one.
    fn out_edges(&self, node: &Identifier) -> Vec<Arc<Edge>>;

    /// Edges whose child is `node`, in creation order.
    fn in_edges(&self, node: &Identifier) -> Vec<Arc<Edge>>;
}

type Adjacency = FxHashMap<Identifier, SmallVec<[Identifier; 4]>>;

/// Graph state reconstructed from the history log for a time window.
///
/// A revision valid over `[valid_from, valid_to)` is part of the projection
/// over `[from, to]` when its interval is non-empty, starts at or before
/// `to`, and ends after `from`. A point projection is the window `[t, t]`.
#[derive(Debug, Default)]
pub struct Projection {
    from: Timestamp,
    to: Timestamp,
    nodes: BTreeMap<Identifier, Vec<Arc<Node>>>,
    edges: BTreeMap<Identifier, Vec<Arc<Edge>>>,
    out_adj: Adjacency,
    in_adj: Adjacency,
}

impl Projection {
    /// Builds the projection over `[from, to]` from a history log.
    pub fn build(log: &HistoryLog, from: Timestamp, to: Timestamp) -> Self {
        let mut projection = Projection {
            from,
            to,
            ..Default::default()
        };
        if from > to {
            return projection;
        }
        for (valid_from, valid_to, revision) in log.validity() {
            if valid_to <= valid_from || valid_from > to || valid_to <= from {
                continue;
            }
            match revision {
                Revision::Node(node) => projection
                    .nodes
                    .entry(node.id.clone())
                    .or_default()
                    .push(Arc::clone(node)),
                Revision::Edge(edge) => {
                    let revisions = projection.edges.entry(edge.id.clone()).or_default();
                    if revisions.is_empty() {
                        projection
                            .out_adj
                            .entry(edge.parent.clone())
                            .or_default()
                            .push(edge.id.clone());
                        projection
                            .in_adj
                            .entry(edge.child.clone())
                            .or_default()
                            .push(edge.id.clone());
                    }
                    revisions.push(Arc::clone(edge));
                }
            }
        }
        projection
    }

    /// Number of distinct nodes in the projection.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges in the projection.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn latest_edges(&self, adj: &Adjacency, node: &Identifier) -> Vec<Arc<Edge>> {
        adj.get(node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id).and_then(|revs| revs.last()))
            .cloned()
            .collect()
    }
}

impl GraphView for Projection {
    fn window(&self) -> (Timestamp, Timestamp) {
        (self.from, self.to)
    }

    fn is_live(&self) -> bool {
        false
    }

    fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.values().flatten().cloned().collect()
    }

    fn node_revisions(&self, id: &Identifier) -> Vec<Arc<Node>> {
        self.nodes.get(id).cloned().unwrap_or_default()
    }

    fn edges(&self) -> Vec<Arc<Edge>> {
        self.edges.values().flatten().cloned().collect()
    }

    fn edge_revisions(&self, id: &Identifier) -> Vec<Arc<Edge>> {
        self.edges.get(id).cloned().unwrap_or_default()
    }

    fn out_edges(&self, node: &Identifier) -> Vec<Arc<Edge>> {
        self.latest_edges(&self.out_adj, node)
    }

    fn in_edges(&self, node: &Identifier) -> Vec<Arc<Edge>> {
        self.latest_edges(&self.in_adj, node)
    }
}
