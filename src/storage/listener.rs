//! Listener bus: synchronous, in-order notification of accepted mutations.
//!
//! Callbacks run while the graph's exclusive lock is held. They must stay
//! short and must never call back into the graph's mutating API; observers
//! with expensive work wrap themselves in a [`QueuedListener`].

use std::fmt;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use super::{Edge, Node};

/// Error returned by a listener callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    /// Creates a listener error from any message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Result type of listener callbacks.
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// One accepted mutation, carrying the affected revision.
#[derive(Clone, Debug)]
pub enum GraphEvent {
    /// A node was created.
    NodeAdded(Arc<Node>),
    /// A node's metadata changed.
    NodeUpdated(Arc<Node>),
    /// A node was deleted; the revision carries the deletion time.
    NodeDeleted(Arc<Node>),
    /// An edge was created.
    EdgeAdded(Arc<Edge>),
    /// An edge's metadata changed.
    EdgeUpdated(Arc<Edge>),
    /// An edge was deleted; the revision carries the deletion time.
    EdgeDeleted(Arc<Edge>),
}

impl GraphEvent {
    /// Short event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            GraphEvent::NodeAdded(_) => "node_added",
            GraphEvent::NodeUpdated(_) => "node_updated",
            GraphEvent::NodeDeleted(_) => "node_deleted",
            GraphEvent::EdgeAdded(_) => "edge_added",
            GraphEvent::EdgeUpdated(_) => "edge_updated",
            GraphEvent::EdgeDeleted(_) => "edge_deleted",
        }
    }
}

/// Observer of graph mutations. Every callback defaults to a no-op.
pub trait GraphListener: Send + Sync {
    /// Name used when reporting failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called after a node was created.
    fn on_node_added(&self, _node: &Node) -> ListenerResult {
        Ok(())
    }

    /// Called after a node's metadata changed.
    fn on_node_updated(&self, _node: &Node) -> ListenerResult {
        Ok(())
    }

    /// Called after a node was deleted.
    fn on_node_deleted(&self, _node: &Node) -> ListenerResult {
        Ok(())
    }

    /// Called after an edge was created.
    fn on_edge_added(&self, _edge: &Edge) -> ListenerResult {
        Ok(())
    }

    /// Called after an edge's metadata changed.
    fn on_edge_updated(&self, _edge: &Edge) -> ListenerResult {
        Ok(())
    }

    /// Called after an edge was deleted.
    fn on_edge_deleted(&self, _edge: &Edge) -> ListenerResult {
        Ok(())
    }

    /// Routes an event to the typed callback. Override to receive the
    /// shared revision itself.
    fn on_event(&self, event: &GraphEvent) -> ListenerResult {
        match event {
            GraphEvent::NodeAdded(n) => self.on_node_added(n),
            GraphEvent::NodeUpdated(n) => self.on_node_updated(n),
            GraphEvent::NodeDeleted(n) => self.on_node_deleted(n),
            GraphEvent::EdgeAdded(e) => self.on_edge_added(e),
            GraphEvent::EdgeUpdated(e) => self.on_edge_updated(e),
            GraphEvent::EdgeDeleted(e) => self.on_edge_deleted(e),
        }
    }
}

/// Handle returned by registration, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Registration-ordered set of listeners. Lives inside the graph state so it
/// is only ever touched under the graph lock.
#[derive(Default)]
pub(crate) struct ListenerBus {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn GraphListener>)>,
}

impl ListenerBus {
    pub(crate) fn add(&mut self, listener: Arc<dyn GraphListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        before != self.listeners.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Invokes every listener in registration order. Failures are collected
    /// and returned; they never stop dispatch to the remaining listeners.
    pub(crate) fn dispatch(&self, event: &GraphEvent) -> Vec<String> {
        let mut failures = Vec::new();
        for (id, listener) in &self.listeners {
            if let Err(err) = listener.on_event(event) {
                warn!(
                    listener = listener.name(),
                    %id,
                    event = event.name(),
                    error = %err,
                    "graph.listener_failed"
                );
                failures.push(format!("{}: {err}", listener.name()));
            }
        }
        failures
    }
}

/// Asynchronous adapter for slow observers.
///
/// Events are queued and replayed, in order, on a dedicated worker thread.
/// Only the enqueue happens under the graph lock. Observers wired this way
/// lose read-after-write consistency, so indexers never use it.
pub struct QueuedListener {
    name: String,
    sender: Mutex<Option<Sender<GraphEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedListener {
    /// Spawns the worker thread feeding `inner`.
    pub fn spawn(name: impl Into<String>, inner: Arc<dyn GraphListener>) -> Arc<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<GraphEvent>();
        let worker_name = name.clone();
        let worker = thread::Builder::new()
            .name(format!("topograph-listener-{worker_name}"))
            .spawn(move || {
                for event in rx {
                    if let Err(err) = inner.on_event(&event) {
                        warn!(
                            listener = %worker_name,
                            event = event.name(),
                            error = %err,
                            "graph.queued_listener_failed"
                        );
                    }
                }
                debug!(listener = %worker_name, "graph.queued_listener_exit");
            })
            .ok();
        Arc::new(Self {
            name,
            sender: Mutex::new(worker.as_ref().map(|_| tx)),
            worker: Mutex::new(worker),
        })
    }

    /// Closes the queue and waits for the worker to drain it. Idempotent.
    pub fn stop(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!(listener = %self.name, "graph.queued_listener_panicked");
            }
        }
    }

    /// Returns true once [`QueuedListener::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl GraphListener for QueuedListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &GraphEvent) -> ListenerResult {
        let guard = self.sender.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(ListenerError::new("queue stopped"));
        };
        tx.send(event.clone())
            .map_err(|_| ListenerError::new("queue worker gone"))
    }
}

impl Drop for QueuedListener {
    fn drop(&mut self) {
        self.stop();
    }
}
