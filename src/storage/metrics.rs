use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking mutation and projection activity in the graph store.
///
/// Implementations collect statistics about accepted mutations, listener
/// failures, and historical projections. This information can be used for
/// monitoring and for tuning history retention.
pub trait StorageMetrics: Send + Sync {
    /// Records the creation of a new node.
    fn node_created(&self);

    /// Records a metadata update of a node.
    fn node_updated(&self);

    /// Records the deletion of a node.
    fn node_deleted(&self);

    /// Records the creation of a new edge.
    fn edge_created(&self);

    /// Records a metadata update of an edge.
    fn edge_updated(&self);

    /// Records the deletion of an edge.
    fn edge_deleted(&self);

    /// Records a duplicate creation or deletion that was ignored.
    fn conflict_ignored(&self);

    /// Records a listener callback that returned an error.
    fn listener_failed(&self);

    /// Records a historical projection built from the history log.
    ///
    /// # Parameters
    /// * `kind` - `"point"` for a single instant, `"interval"` for a window.
    fn projection_built(&self, kind: &'static str);
}

/// A no-op implementation of [`StorageMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopMetrics;

impl StorageMetrics for NoopMetrics {
    fn node_created(&self) {}
    fn node_updated(&self) {}
    fn node_deleted(&self) {}
    fn edge_created(&self) {}
    fn edge_updated(&self) {}
    fn edge_deleted(&self) {}
    fn conflict_ignored(&self) {}
    fn listener_failed(&self) {}
    fn projection_built(&self, _kind: &'static str) {}
}

/// A thread-safe counter-based implementation of [`StorageMetrics`].
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Number of nodes created.
    pub nodes_created: AtomicU64,
    /// Number of node metadata updates.
    pub nodes_updated: AtomicU64,
    /// Number of nodes deleted.
    pub nodes_deleted: AtomicU64,
    /// Number of edges created.
    pub edges_created: AtomicU64,
    /// Number of edge metadata updates.
    pub edges_updated: AtomicU64,
    /// Number of edges deleted.
    pub edges_deleted: AtomicU64,
    /// Number of ignored duplicate creations/deletions.
    pub conflicts_ignored: AtomicU64,
    /// Number of listener callbacks that failed.
    pub listener_failures: AtomicU64,
    /// Number of point-in-time projections built.
    pub point_projections: AtomicU64,
    /// Number of interval projections built.
    pub interval_projections: AtomicU64,
}

impl CounterMetrics {
    /// Reads a counter with relaxed ordering.
    pub fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl StorageMetrics for CounterMetrics {
    fn node_created(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    fn node_updated(&self) {
        self.nodes_updated.fetch_add(1, Ordering::Relaxed);
    }

    fn node_deleted(&self) {
        self.nodes_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_created(&self) {
        self.edges_created.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_updated(&self) {
        self.edges_updated.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_deleted(&self) {
        self.edges_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn conflict_ignored(&self) {
        self.conflicts_ignored.fetch_add(1, Ordering::Relaxed);
    }

    fn listener_failed(&self) {
        self.listener_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn projection_built(&self, kind: &'static str) {
        match kind {
            "point" => {
                self.point_projections.fetch_add(1, Ordering::Relaxed);
            }
            "interval" => {
                self.interval_projections.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`], which discards all
/// recorded metrics.
pub fn default_metrics() -> Arc<dyn StorageMetrics> {
    Arc::new(NoopMetrics)
}
