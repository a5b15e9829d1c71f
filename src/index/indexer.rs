use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::metadata::{path, ElementFilter, Value};
use crate::storage::listener::ListenerBus;
use crate::storage::{
    Graph, GraphEvent, GraphListener, ListenerError, ListenerId, ListenerResult, Node,
};
use crate::types::Identifier;

/// Hashable projection of a scalar metadata value.
///
/// Integral floats fold into `Int` so that `1500` and `1500.0` share a
/// bucket, matching how filters compare numbers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// String key.
    Str(String),
    /// Integer key.
    Int(i64),
    /// Boolean key.
    Bool(bool),
    /// Non-integral float key, by bit pattern.
    Float(u64),
}

impl IndexKey {
    /// Key for a scalar value; `None` for null, sequences and documents.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(IndexKey::Str(s.clone())),
            Value::Int(i) => Some(IndexKey::Int(*i)),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(IndexKey::Int(*f as i64))
            }
            Value::Float(f) => Some(IndexKey::Float(f.to_bits())),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Every key under which `node` is filed for `key_path`. Sequence
    /// values contribute each scalar element.
    fn for_node(node: &Node, key_path: &str) -> SmallVec<[IndexKey; 1]> {
        let mut keys: SmallVec<[IndexKey; 1]> = SmallVec::new();
        let mut push = |value: &Value| {
            if let Some(k) = IndexKey::from_value(value) {
                if !keys.contains(&k) {
                    keys.push(k);
                }
            }
        };
        for value in path::collect(&node.metadata, key_path) {
            match value {
                Value::List(items) => items.iter().for_each(&mut push),
                other => push(other),
            }
        }
        keys
    }
}

#[derive(Default)]
struct IndexState {
    placements: FxHashMap<Identifier, SmallVec<[IndexKey; 1]>>,
    buckets: FxHashMap<IndexKey, BTreeMap<Identifier, Arc<Node>>>,
}

impl IndexState {
    fn unfile(&mut self, id: &Identifier) {
        let Some(keys) = self.placements.remove(id) else {
            return;
        };
        for key in keys {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.remove(id);
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
    }

    fn file(&mut self, node: &Arc<Node>, keys: SmallVec<[IndexKey; 1]>) {
        for key in &keys {
            self.buckets
                .entry(key.clone())
                .or_default()
                .insert(node.id.clone(), Arc::clone(node));
        }
        if !keys.is_empty() {
            self.placements.insert(node.id.clone(), keys);
        }
    }
}

/// The listener half of an indexer. Holds no reference to the graph so that
/// registration does not create an ownership cycle.
struct IndexCore {
    name: String,
    filter: ElementFilter,
    key: String,
    state: RwLock<IndexState>,
    listeners: Mutex<ListenerBus>,
}

impl IndexCore {
    /// Files `node` again and returns the membership change to report, if
    /// any.
    fn refile(&self, node: &Arc<Node>) -> Option<GraphEvent> {
        let mut state = self.state.write();
        let was_filed = state.placements.contains_key(&node.id);
        state.unfile(&node.id);
        if self.filter.matches(&node.metadata) {
            let keys = IndexKey::for_node(node, &self.key);
            trace!(indexer = %self.name, id = %node.id, keys = keys.len(), "indexer.refile");
            state.file(node, keys);
        }
        match (was_filed, state.placements.contains_key(&node.id)) {
            (false, true) => Some(GraphEvent::NodeAdded(Arc::clone(node))),
            (true, true) => Some(GraphEvent::NodeUpdated(Arc::clone(node))),
            (true, false) => Some(GraphEvent::NodeDeleted(Arc::clone(node))),
            (false, false) => None,
        }
    }

    fn forget(&self, node: &Arc<Node>) -> Option<GraphEvent> {
        trace!(indexer = %self.name, id = %node.id, "indexer.forget");
        let mut state = self.state.write();
        let was_filed = state.placements.contains_key(&node.id);
        state.unfile(&node.id);
        was_filed.then(|| GraphEvent::NodeDeleted(Arc::clone(node)))
    }

    /// Forwards a membership change to the indexer's own listeners. Runs
    /// after the state lock is released so listeners may read the index.
    fn notify(&self, event: &GraphEvent) -> ListenerResult {
        let failures = self.listeners.lock().dispatch(event);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ListenerError::new(failures.join("; ")))
        }
    }

    fn rebuild(&self, nodes: Vec<Arc<Node>>) {
        let mut fresh = IndexState::default();
        for node in nodes.iter().filter(|n| self.filter.matches(&n.metadata)) {
            fresh.file(node, IndexKey::for_node(node, &self.key));
        }
        let mut state = self.state.write();
        *state = fresh;
        debug!(
            indexer = %self.name,
            nodes = state.placements.len(),
            keys = state.buckets.len(),
            "indexer.rebuilt"
        );
    }
}

/// Live node set listener adapter; the indexer registers this on start.
struct IndexListener(Arc<IndexCore>);

impl GraphListener for IndexListener {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn on_event(&self, event: &GraphEvent) -> ListenerResult {
        let change = match event {
            GraphEvent::NodeAdded(node) | GraphEvent::NodeUpdated(node) => self.0.refile(node),
            GraphEvent::NodeDeleted(node) => self.0.forget(node),
            _ => None,
        };
        match change {
            Some(change) => self.0.notify(&change),
            None => Ok(()),
        }
    }
}

/// Live secondary index from the value of one metadata key to the nodes
/// matching a filter.
///
/// Updates happen synchronously under the graph's exclusive lock, so after
/// any mutation returns, the index equals a full scan of the live graph.
///
/// Listeners added with [`MetadataIndexer::add_listener`] hear about index
/// membership rather than raw graph events: `NodeAdded` when a node gets
/// filed, `NodeUpdated` when a filed node changes and stays filed, and
/// `NodeDeleted` when it leaves the index. They run under the same lock as
/// graph listeners and follow the same rules. The scans done by `start` and
/// `scan` are not reported.
pub struct MetadataIndexer {
    graph: Arc<Graph>,
    core: Arc<IndexCore>,
    registration: Mutex<Option<ListenerId>>,
}

impl MetadataIndexer {
    /// Creates a stopped indexer over `graph` filing nodes that match
    /// `filter` under the value of `key`.
    pub fn new(graph: Arc<Graph>, filter: ElementFilter, key: impl Into<String>) -> Arc<Self> {
        let key = key.into();
        Arc::new(Self {
            graph,
            core: Arc::new(IndexCore {
                name: format!("indexer[{key}]"),
                filter,
                key,
                state: RwLock::new(IndexState::default()),
                listeners: Mutex::new(ListenerBus::default()),
            }),
            registration: Mutex::new(None),
        })
    }

    /// Subscribes to the graph and files every live node, both under the
    /// exclusive lock so no mutation slips between scan and subscription.
    /// Calling it on a started indexer does nothing.
    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        // Lock order is graph, then registration; queries check
        // `is_running` while holding the graph's shared lock.
        let mut writer = self.graph.write();
        let mut registration = self.registration.lock();
        if registration.is_some() {
            return;
        }
        let id = writer.add_listener(Arc::new(IndexListener(Arc::clone(&self.core))));
        self.core.rebuild(writer.view().nodes());
        *registration = Some(id);
        debug!(indexer = %self.core.name, %id, "indexer.started");
    }

    /// Unsubscribes from the graph. Idempotent. The last contents stay
    /// readable but no longer follow the graph.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        let mut writer = self.graph.write();
        if let Some(id) = self.registration.lock().take() {
            writer.remove_listener(id);
            debug!(indexer = %self.core.name, %id, "indexer.stopped");
        }
    }

    /// Returns true while subscribed.
    pub fn is_running(&self) -> bool {
        self.registration.lock().is_some()
    }

    /// Recomputes the index from the live graph. Used to reconcile after a
    /// mutation reported a listener failure.
    pub fn scan(&self) {
        let writer = self.graph.write();
        self.core.rebuild(writer.view().nodes());
    }

    /// Subscribes `listener` to membership changes of this index.
    pub fn add_listener(&self, listener: Arc<dyn GraphListener>) -> ListenerId {
        let id = self.core.listeners.lock().add(listener);
        debug!(indexer = %self.core.name, %id, "indexer.listener_added");
        id
    }

    /// Unsubscribes a membership listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.core.listeners.lock().remove(id)
    }

    /// Nodes filed under `value`, ordered by identifier.
    pub fn get(&self, value: impl Into<Value>) -> Vec<Arc<Node>> {
        self.lookup(&value.into())
    }

    /// Nodes filed under `value`, ordered by identifier.
    pub fn lookup(&self, value: &Value) -> Vec<Arc<Node>> {
        let Some(key) = IndexKey::from_value(value) else {
            return Vec::new();
        };
        self.core
            .state
            .read()
            .buckets
            .get(&key)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Filter a node must satisfy to be indexed.
    pub fn filter(&self) -> &ElementFilter {
        &self.core.filter
    }

    /// Metadata key the index projects on.
    pub fn key(&self) -> &str {
        &self.core.key
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.core.state.read().placements.len()
    }

    /// Returns true when no node is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the whole index as `key -> node ids`, for comparisons
    /// against a fresh scan.
    pub fn snapshot(&self) -> FxHashMap<IndexKey, Vec<Identifier>> {
        self.core
            .state
            .read()
            .buckets
            .iter()
            .map(|(k, bucket)| (k.clone(), bucket.keys().cloned().collect()))
            .collect()
    }
}

impl Drop for MetadataIndexer {
    fn drop(&mut self) {
        self.stop();
    }
}
