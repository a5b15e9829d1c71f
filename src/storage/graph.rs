use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::history::{HistoryEntry, HistoryLog, HistoryOp, Revision};
use super::listener::{GraphEvent, GraphListener, ListenerBus, ListenerId};
use super::metrics::{default_metrics, StorageMetrics};
use super::options::GraphOptions;
use super::view::{GraphView, Projection};
use super::{Edge, Node};
use crate::metadata::{Metadata, MetadataPatch};
use crate::types::{Clock, EntityKind, Identifier, Result, Timestamp, TopoError};

type Adjacency = FxHashMap<Identifier, SmallVec<[Identifier; 4]>>;

/// Everything guarded by the graph lock.
#[derive(Default)]
pub(crate) struct GraphState {
    nodes: BTreeMap<Identifier, Arc<Node>>,
    edges: BTreeMap<Identifier, Arc<Edge>>,
    out_adj: Adjacency,
    in_adj: Adjacency,
    retired_nodes: FxHashSet<Identifier>,
    retired_edges: FxHashSet<Identifier>,
    history: HistoryLog,
    listeners: ListenerBus,
    last_stamp: Timestamp,
}

impl GraphState {
    fn adjacent_edges(&self, adj: &Adjacency, node: &Identifier) -> Vec<Arc<Edge>> {
        adj.get(node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
            .cloned()
            .collect()
    }
}

impl GraphView for GraphState {
    fn window(&self) -> (Timestamp, Timestamp) {
        (Timestamp::MIN, Timestamp::MAX)
    }

    fn is_live(&self) -> bool {
        true
    }

    fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.values().cloned().collect()
    }

    fn node_revisions(&self, id: &Identifier) -> Vec<Arc<Node>> {
        self.nodes.get(id).cloned().into_iter().collect()
    }

    fn edges(&self) -> Vec<Arc<Edge>> {
        self.edges.values().cloned().collect()
    }

    fn edge_revisions(&self, id: &Identifier) -> Vec<Arc<Edge>> {
        self.edges.get(id).cloned().into_iter().collect()
    }

    fn out_edges(&self, node: &Identifier) -> Vec<Arc<Edge>> {
        self.adjacent_edges(&self.out_adj, node)
    }

    fn in_edges(&self, node: &Identifier) -> Vec<Arc<Edge>> {
        self.adjacent_edges(&self.in_adj, node)
    }
}

/// Time-versioned property graph.
///
/// A single reader/writer lock guards the live state, the history log and
/// the listener bus. Mutations hold it exclusively for their full duration,
/// listener dispatch included, so by the time a mutation returns every
/// listener has observed it. Query chains hold it shared.
pub struct Graph {
    state: RwLock<GraphState>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn StorageMetrics>,
    default_host: String,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new(options: GraphOptions) -> Arc<Self> {
        let GraphOptions {
            clock,
            metrics,
            default_host,
        } = options;
        Arc::new(Self {
            state: RwLock::new(GraphState::default()),
            clock,
            metrics: metrics.unwrap_or_else(default_metrics),
            default_host,
        })
    }

    /// Takes the shared lock.
    pub fn read(&self) -> GraphReader<'_> {
        GraphReader {
            graph: self,
            state: self.state.read(),
        }
    }

    /// Takes the exclusive lock. Every mutation made through the returned
    /// guard becomes visible to readers at once, when the guard drops.
    pub fn write(&self) -> GraphWriter<'_> {
        GraphWriter {
            graph: self,
            state: self.state.write(),
        }
    }

    /// Current time of the graph clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Creates a node; see [`GraphWriter::new_node`].
    pub fn new_node(
        &self,
        id: impl Into<Identifier>,
        host: &str,
        metadata: Metadata,
    ) -> Result<Arc<Node>> {
        self.write().new_node(id, host, metadata)
    }

    /// Creates an edge; see [`GraphWriter::new_edge`].
    pub fn new_edge(
        &self,
        id: impl Into<Identifier>,
        parent: &Identifier,
        child: &Identifier,
        metadata: Metadata,
    ) -> Result<Arc<Edge>> {
        self.write().new_edge(id, parent, child, metadata)
    }

    /// Returns the live revision of a node.
    pub fn get_node(&self, id: &Identifier) -> Option<Arc<Node>> {
        self.state.read().nodes.get(id).cloned()
    }

    /// Returns the live revision of an edge.
    pub fn get_edge(&self, id: &Identifier) -> Option<Arc<Edge>> {
        self.state.read().edges.get(id).cloned()
    }

    /// Patches node or edge metadata; see [`GraphWriter::update_metadata`].
    pub fn update_metadata(&self, id: &Identifier, patch: &MetadataPatch) -> Result<bool> {
        self.write().update_metadata(id, patch)
    }

    /// Patches node metadata; see [`GraphWriter::update_node_metadata`].
    pub fn update_node_metadata(
        &self,
        id: &Identifier,
        patch: &MetadataPatch,
    ) -> Result<Arc<Node>> {
        self.write().update_node_metadata(id, patch)
    }

    /// Deletes a node and its incident edges; see [`GraphWriter::del_node`].
    pub fn del_node(&self, id: &Identifier) -> Result<bool> {
        self.write().del_node(id)
    }

    /// Deletes an edge; see [`GraphWriter::del_edge`].
    pub fn del_edge(&self, id: &Identifier) -> Result<bool> {
        self.write().del_edge(id)
    }

    /// Registers a listener; see [`GraphWriter::add_listener`].
    pub fn add_listener(&self, listener: Arc<dyn GraphListener>) -> ListenerId {
        self.write().add_listener(listener)
    }

    /// Unregisters a listener. Unknown identifiers are ignored.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.write().remove_listener(id)
    }

    /// Number of retained history entries.
    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    /// Drops history no longer needed to answer queries at or after
    /// `before`. Returns the number of entries removed.
    pub fn prune_history(&self, before: Timestamp) -> usize {
        let removed = self.state.write().history.prune(before);
        debug!(before, removed, "graph.history_pruned");
        removed
    }
}

/// Shared-lock guard. Dereferences to the live [`GraphView`].
pub struct GraphReader<'a> {
    graph: &'a Graph,
    state: RwLockReadGuard<'a, GraphState>,
}

impl<'a> GraphReader<'a> {
    /// Live revision of a node.
    pub fn get_node(&self, id: &Identifier) -> Option<Arc<Node>> {
        self.state.nodes.get(id).cloned()
    }

    /// Live revision of an edge.
    pub fn get_edge(&self, id: &Identifier) -> Option<Arc<Edge>> {
        self.state.edges.get(id).cloned()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.state.nodes.len()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.state.edges.len()
    }

    /// Retained history entries in log order.
    pub fn history(&self) -> &[HistoryEntry] {
        self.state.history.entries()
    }

    /// The graph as it was at instant `at`.
    pub fn projection_at(&self, at: Timestamp) -> Projection {
        self.graph.metrics.projection_built("point");
        trace!(at, "graph.projection_point");
        Projection::build(&self.state.history, at, at)
    }

    /// Every revision valid at some point of `[from, to]`.
    pub fn projection_between(&self, from: Timestamp, to: Timestamp) -> Projection {
        self.graph.metrics.projection_built("interval");
        trace!(from, to, "graph.projection_interval");
        Projection::build(&self.state.history, from, to)
    }
}

impl Deref for GraphReader<'_> {
    type Target = dyn GraphView + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.state
    }
}

/// Exclusive-lock guard carrying the mutation API.
///
/// Listener callbacks run while this guard is held; a listener calling
/// back into [`Graph`] deadlocks.
pub struct GraphWriter<'a> {
    graph: &'a Graph,
    state: RwLockWriteGuard<'a, GraphState>,
}

impl<'a> GraphWriter<'a> {
    /// Creates a node.
    ///
    /// Creating an identifier that is already live is a no-op returning the
    /// existing node. Identifiers of deleted nodes are never reused.
    pub fn new_node(
        &mut self,
        id: impl Into<Identifier>,
        host: &str,
        metadata: Metadata,
    ) -> Result<Arc<Node>> {
        let id = id.into();
        if let Some(existing) = self.state.nodes.get(&id) {
            debug!(%id, "graph.node_conflict_ignored");
            self.graph.metrics.conflict_ignored();
            return Ok(Arc::clone(existing));
        }
        if self.state.retired_nodes.contains(&id) {
            return Err(TopoError::IdentifierRetired {
                kind: EntityKind::Node,
                id,
            });
        }
        let at = self.stamp();
        let node = Arc::new(Node {
            id: id.clone(),
            host: self.host_or_default(host),
            metadata,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            revision: 1,
        });
        self.state.nodes.insert(id.clone(), Arc::clone(&node));
        debug!(%id, at, "graph.node_added");
        self.graph.metrics.node_created();
        let failures = self.commit(at, HistoryOp::Added, Revision::Node(Arc::clone(&node)));
        self.settle(EntityKind::Node, &id, failures, node)
    }

    /// Creates an edge from `parent` to `child`.
    ///
    /// Both endpoints must be live. Duplicate creation of a live identifier
    /// is a no-op returning the existing edge.
    pub fn new_edge(
        &mut self,
        id: impl Into<Identifier>,
        parent: &Identifier,
        child: &Identifier,
        metadata: Metadata,
    ) -> Result<Arc<Edge>> {
        let id = id.into();
        if let Some(existing) = self.state.edges.get(&id) {
            debug!(%id, "graph.edge_conflict_ignored");
            self.graph.metrics.conflict_ignored();
            return Ok(Arc::clone(existing));
        }
        if self.state.retired_edges.contains(&id) {
            return Err(TopoError::IdentifierRetired {
                kind: EntityKind::Edge,
                id,
            });
        }
        let host = match self.state.nodes.get(parent) {
            Some(p) => p.host.clone(),
            None => return Err(TopoError::node_not_found(parent)),
        };
        if !self.state.nodes.contains_key(child) {
            return Err(TopoError::node_not_found(child));
        }
        let at = self.stamp();
        let edge = Arc::new(Edge {
            id: id.clone(),
            parent: parent.clone(),
            child: child.clone(),
            host,
            metadata,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            revision: 1,
        });
        self.state.edges.insert(id.clone(), Arc::clone(&edge));
        self.state
            .out_adj
            .entry(parent.clone())
            .or_default()
            .push(id.clone());
        self.state
            .in_adj
            .entry(child.clone())
            .or_default()
            .push(id.clone());
        debug!(%id, %parent, %child, at, "graph.edge_added");
        self.graph.metrics.edge_created();
        let failures = self.commit(at, HistoryOp::Added, Revision::Edge(Arc::clone(&edge)));
        self.settle(EntityKind::Edge, &id, failures, edge)
    }

    /// Live revision of a node.
    pub fn get_node(&self, id: &Identifier) -> Option<Arc<Node>> {
        self.state.nodes.get(id).cloned()
    }

    /// Live revision of an edge.
    pub fn get_edge(&self, id: &Identifier) -> Option<Arc<Edge>> {
        self.state.edges.get(id).cloned()
    }

    /// Live view of the graph as it stands inside this batch.
    pub fn view(&self) -> &dyn GraphView {
        &*self.state
    }

    /// Applies a metadata patch to a live node and returns its current
    /// revision. A patch that changes nothing records nothing.
    pub fn update_node_metadata(
        &mut self,
        id: &Identifier,
        patch: &MetadataPatch,
    ) -> Result<Arc<Node>> {
        let current = self
            .state
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| TopoError::node_not_found(id))?;
        let Some(metadata) = patch.apply(&current.metadata) else {
            trace!(%id, "graph.node_update_noop");
            return Ok(current);
        };
        let at = self.stamp();
        let node = Arc::new(Node {
            metadata,
            updated_at: at,
            revision: current.revision + 1,
            ..(*current).clone()
        });
        self.state.nodes.insert(id.clone(), Arc::clone(&node));
        debug!(%id, at, revision = node.revision, "graph.node_updated");
        self.graph.metrics.node_updated();
        let failures = self.commit(at, HistoryOp::Updated, Revision::Node(Arc::clone(&node)));
        self.settle(EntityKind::Node, id, failures, node)
    }

    /// Applies a metadata patch to a live edge and returns its current
    /// revision.
    pub fn update_edge_metadata(
        &mut self,
        id: &Identifier,
        patch: &MetadataPatch,
    ) -> Result<Arc<Edge>> {
        let current = self
            .state
            .edges
            .get(id)
            .cloned()
            .ok_or_else(|| TopoError::edge_not_found(id))?;
        let Some(metadata) = patch.apply(&current.metadata) else {
            trace!(%id, "graph.edge_update_noop");
            return Ok(current);
        };
        let at = self.stamp();
        let edge = Arc::new(Edge {
            metadata,
            updated_at: at,
            revision: current.revision + 1,
            ..(*current).clone()
        });
        self.state.edges.insert(id.clone(), Arc::clone(&edge));
        debug!(%id, at, revision = edge.revision, "graph.edge_updated");
        self.graph.metrics.edge_updated();
        let failures = self.commit(at, HistoryOp::Updated, Revision::Edge(Arc::clone(&edge)));
        self.settle(EntityKind::Edge, id, failures, edge)
    }

    /// Patches the metadata of whichever live entity carries `id`. Returns
    /// true when a new revision was recorded.
    pub fn update_metadata(&mut self, id: &Identifier, patch: &MetadataPatch) -> Result<bool> {
        if let Some(before) = self.state.nodes.get(id).map(|n| n.revision) {
            let after = self.update_node_metadata(id, patch)?;
            return Ok(after.revision != before);
        }
        if let Some(before) = self.state.edges.get(id).map(|e| e.revision) {
            let after = self.update_edge_metadata(id, patch)?;
            return Ok(after.revision != before);
        }
        Err(TopoError::NotFound {
            kind: EntityKind::Node,
            id: id.clone(),
        })
    }

    /// Deletes a node, deleting its incident edges first. Returns false
    /// when no live node carries `id`.
    pub fn del_node(&mut self, id: &Identifier) -> Result<bool> {
        let Some(current) = self.state.nodes.get(id).cloned() else {
            trace!(%id, "graph.node_delete_absent");
            return Ok(false);
        };
        let mut incident: SmallVec<[Identifier; 8]> = SmallVec::new();
        for adj in [&self.state.out_adj, &self.state.in_adj] {
            for edge_id in adj.get(id).into_iter().flatten() {
                if !incident.contains(edge_id) {
                    incident.push(edge_id.clone());
                }
            }
        }
        let mut failures = Vec::new();
        for edge_id in &incident {
            failures.extend(self.remove_edge(edge_id));
        }

        let at = self.stamp();
        let node = Arc::new(Node {
            updated_at: at,
            deleted_at: Some(at),
            revision: current.revision + 1,
            ..(*current).clone()
        });
        self.state.nodes.remove(id);
        self.state.out_adj.remove(id);
        self.state.in_adj.remove(id);
        self.state.retired_nodes.insert(id.clone());
        debug!(%id, at, cascaded = incident.len(), "graph.node_deleted");
        self.graph.metrics.node_deleted();
        failures.extend(self.commit(at, HistoryOp::Deleted, Revision::Node(node)));
        self.settle(EntityKind::Node, id, failures, true)
    }

    /// Deletes an edge. Returns false when no live edge carries `id`.
    pub fn del_edge(&mut self, id: &Identifier) -> Result<bool> {
        if !self.state.edges.contains_key(id) {
            trace!(%id, "graph.edge_delete_absent");
            return Ok(false);
        }
        let failures = self.remove_edge(id);
        self.settle(EntityKind::Edge, id, failures, true)
    }

    /// Registers a listener; it observes every mutation committed after
    /// this call, starting with the ones made through this guard.
    pub fn add_listener(&mut self, listener: Arc<dyn GraphListener>) -> ListenerId {
        let id = self.state.listeners.add(listener);
        debug!(%id, total = self.state.listeners.len(), "graph.listener_added");
        id
    }

    /// Unregisters a listener. Unknown identifiers are ignored.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let removed = self.state.listeners.remove(id);
        if removed {
            debug!(%id, "graph.listener_removed");
        }
        removed
    }

    fn remove_edge(&mut self, id: &Identifier) -> Vec<String> {
        let Some(current) = self.state.edges.remove(id) else {
            return Vec::new();
        };
        let state = &mut *self.state;
        for (adj, endpoint) in [
            (&mut state.out_adj, &current.parent),
            (&mut state.in_adj, &current.child),
        ] {
            if let Some(list) = adj.get_mut(endpoint) {
                list.retain(|e| e != id);
                if list.is_empty() {
                    adj.remove(endpoint);
                }
            }
        }
        state.retired_edges.insert(id.clone());
        let at = self.stamp();
        let edge = Arc::new(Edge {
            updated_at: at,
            deleted_at: Some(at),
            revision: current.revision + 1,
            ..(*current).clone()
        });
        debug!(%id, at, "graph.edge_deleted");
        self.graph.metrics.edge_deleted();
        self.commit(at, HistoryOp::Deleted, Revision::Edge(edge))
    }

    fn stamp(&mut self) -> Timestamp {
        let at = self.graph.clock.now().max(self.state.last_stamp);
        self.state.last_stamp = at;
        at
    }

    fn host_or_default(&self, host: &str) -> String {
        if host.is_empty() {
            self.graph.default_host.clone()
        } else {
            host.to_owned()
        }
    }

    fn commit(&mut self, at: Timestamp, op: HistoryOp, revision: Revision) -> Vec<String> {
        let event = match (&revision, op) {
            (Revision::Node(n), HistoryOp::Added) => GraphEvent::NodeAdded(Arc::clone(n)),
            (Revision::Node(n), HistoryOp::Updated) => GraphEvent::NodeUpdated(Arc::clone(n)),
            (Revision::Node(n), HistoryOp::Deleted) => GraphEvent::NodeDeleted(Arc::clone(n)),
            (Revision::Edge(e), HistoryOp::Added) => GraphEvent::EdgeAdded(Arc::clone(e)),
            (Revision::Edge(e), HistoryOp::Updated) => GraphEvent::EdgeUpdated(Arc::clone(e)),
            (Revision::Edge(e), HistoryOp::Deleted) => GraphEvent::EdgeDeleted(Arc::clone(e)),
        };
        self.state.history.append(at, op, revision);
        self.state.listeners.dispatch(&event)
    }

    fn settle<T>(
        &self,
        kind: EntityKind,
        id: &Identifier,
        failures: Vec<String>,
        value: T,
    ) -> Result<T> {
        if failures.is_empty() {
            return Ok(value);
        }
        for _ in &failures {
            self.graph.metrics.listener_failed();
        }
        Err(TopoError::ListenerFailed {
            kind,
            id: id.clone(),
            failures,
        })
    }
}

impl Deref for GraphWriter<'_> {
    type Target = dyn GraphView + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.state
    }
}
