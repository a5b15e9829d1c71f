//! Versioned graph store.
//!
//! Holds the live nodes and edges, the append-only history log used to
//! answer queries about past states, and the listener bus notified of every
//! accepted mutation.

mod edge;
mod graph;
pub mod history;
pub mod listener;
mod metrics;
mod node;
mod options;
mod view;

pub use edge::{Edge, RELATION_TYPE_KEY};
pub use graph::{Graph, GraphReader, GraphWriter};
pub use history::{HistoryEntry, HistoryOp, Revision};
pub use listener::{
    GraphEvent, GraphListener, ListenerError, ListenerId, ListenerResult, QueuedListener,
};
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, StorageMetrics};
pub use node::Node;
pub use options::GraphOptions;
pub use view::{GraphView, Projection};
