use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use super::InterfaceMetric;
use crate::types::{Identifier, Result, Timestamp, TopoError};

/// Per-node interface metric series.
///
/// Each series stays ordered by start time: a record is inserted after
/// every record whose start is not later than its own, so readers never
/// observe an out-of-order sequence. Every record is also stamped with a
/// store-wide append sequence so merges across nodes can break start-time
/// ties by arrival. Series outlive their node, which keeps them reachable
/// through past contexts.
#[derive(Debug, Default)]
pub struct MetricStore {
    series: RwLock<FxHashMap<Identifier, Vec<InterfaceMetric>>>,
    next_seq: AtomicU64,
}

impl MetricStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the series of `node`.
    pub fn append(&self, node: &Identifier, mut record: InterfaceMetric) -> Result<()> {
        if record.last < record.start {
            return Err(TopoError::InvalidMetric("last precedes start"));
        }
        let mut series = self.series.write();
        // Taken under the write lock so sequence order is insertion order.
        record.seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let records = series.entry(node.clone()).or_default();
        let at = records.partition_point(|r| r.start <= record.start);
        records.insert(at, record);
        trace!(%node, start = record.start, seq = record.seq, position = at, "series.append");
        Ok(())
    }

    /// Records of `node` overlapping `[from, to]`, ordered by start.
    pub fn records_in(&self, node: &Identifier, from: Timestamp, to: Timestamp) -> Vec<InterfaceMetric> {
        self.series
            .read()
            .get(node)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.intersects(from, to))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every record of `node`.
    pub fn records(&self, node: &Identifier) -> Vec<InterfaceMetric> {
        self.records_in(node, Timestamp::MIN, Timestamp::MAX)
    }

    /// Number of records held for `node`.
    pub fn len(&self, node: &Identifier) -> usize {
        self.series.read().get(node).map_or(0, Vec::len)
    }

    /// Number of nodes with at least one record.
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Total number of records.
    pub fn total_records(&self) -> usize {
        self.series.read().values().map(Vec::len).sum()
    }
}
