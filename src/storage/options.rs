use std::sync::Arc;

use crate::types::{Clock, SystemClock};

/// Configuration options supplied when creating a [`super::Graph`].
#[derive(Clone)]
pub struct GraphOptions {
    /// Source of mutation timestamps.
    pub clock: Arc<dyn Clock>,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn super::metrics::StorageMetrics>>,
    /// Host label stamped on nodes created without one.
    pub default_host: String,
}

impl GraphOptions {
    /// Creates options with the wall clock and no metrics.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            metrics: None,
            default_host: String::new(),
        }
    }

    /// Sets the clock used to stamp mutations.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn super::metrics::StorageMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the host label used when a mutation supplies an empty one.
    pub fn default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = host.into();
        self
    }
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self::new()
    }
}
