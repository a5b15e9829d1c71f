//! Append-only log of accepted mutations.
//!
//! Every entry carries the full post-mutation revision of the entity, so a
//! projection at any instant is a single forward pass over the log.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{Edge, Node};
use crate::types::{EntityKind, Identifier, Timestamp};

/// Kind of mutation recorded by a [`HistoryEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryOp {
    /// The entity was created.
    Added,
    /// The entity's metadata changed.
    Updated,
    /// The entity was deleted.
    Deleted,
}

/// Snapshot of an entity as it was after one mutation.
#[derive(Clone, Debug)]
pub enum Revision {
    /// Node revision.
    Node(Arc<Node>),
    /// Edge revision.
    Edge(Arc<Edge>),
}

impl Revision {
    /// Identifier of the entity.
    pub fn id(&self) -> &Identifier {
        match self {
            Revision::Node(n) => &n.id,
            Revision::Edge(e) => &e.id,
        }
    }

    /// Kind of the entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            Revision::Node(_) => EntityKind::Node,
            Revision::Edge(_) => EntityKind::Edge,
        }
    }
}

/// One accepted mutation.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    /// Position in the log, strictly increasing.
    pub seq: u64,
    /// Mutation timestamp.
    pub at: Timestamp,
    /// Mutation kind.
    pub op: HistoryOp,
    /// Entity state after the mutation.
    pub revision: Revision,
}

/// Ordered mutation log. Timestamps are non-decreasing along the log.
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    next_seq: u64,
}

impl HistoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry and returns its sequence number.
    pub(crate) fn append(&mut self, at: Timestamp, op: HistoryOp, revision: Revision) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        debug_assert!(self.entries.last().map_or(true, |e| e.at <= at));
        self.entries.push(HistoryEntry {
            seq,
            at,
            op,
            revision,
        });
        seq
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing has been recorded (or everything was pruned).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained entries in log order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Timestamp of the oldest retained entry.
    pub fn oldest(&self) -> Option<Timestamp> {
        self.entries.first().map(|e| e.at)
    }

    /// Walks the log and yields every revision together with its validity
    /// interval `[valid_from, valid_to)`. Deletion markers are not yielded;
    /// they only close the preceding revision. Revisions still current end
    /// at `Timestamp::MAX`.
    pub fn validity(&self) -> Vec<(Timestamp, Timestamp, &Revision)> {
        let mut out = Vec::with_capacity(self.entries.len());
        // Index into `out` of the open revision of each entity.
        let mut open: FxHashMap<(EntityKind, &Identifier), usize> = FxHashMap::default();
        for entry in &self.entries {
            let key = (entry.revision.kind(), entry.revision.id());
            if let Some(idx) = open.remove(&key) {
                let slot: &mut (Timestamp, Timestamp, &Revision) = &mut out[idx];
                slot.1 = entry.at;
            }
            if entry.op != HistoryOp::Deleted {
                open.insert(key, out.len());
                out.push((entry.at, Timestamp::MAX, &entry.revision));
            }
        }
        out
    }

    /// Drops every revision that stopped being valid at or before `before`,
    /// together with deletion markers older than that instant. Projections
    /// at instants `>= before` are unaffected. Returns the number of entries
    /// removed.
    pub(crate) fn prune(&mut self, before: Timestamp) -> usize {
        let mut superseded_at: FxHashMap<(EntityKind, Identifier), Timestamp> =
            FxHashMap::default();
        let mut keep = vec![true; self.entries.len()];
        for (idx, entry) in self.entries.iter().enumerate().rev() {
            let key = (entry.revision.kind(), entry.revision.id().clone());
            let dead = match entry.op {
                HistoryOp::Deleted => entry.at <= before,
                _ => superseded_at.get(&key).is_some_and(|&to| to <= before),
            };
            keep[idx] = !dead;
            superseded_at.insert(key, entry.at);
        }
        let before_len = self.entries.len();
        let mut flags = keep.into_iter();
        self.entries.retain(|_| flags.next().unwrap_or(true));
        before_len - self.entries.len()
    }
}
