//! Step-by-step evaluation of a checked traversal over one graph view.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::trace;

use super::ast::{Direction, SetKind, Step, Traversal};
use super::errors::QueryError;
use crate::index::MetadataIndexer;
use crate::metadata::ElementFilter;
use crate::series::aggregate::{self, MetricSet};
use crate::series::{InterfaceMetric, MetricStore};
use crate::storage::{Edge, GraphView, Node};
use crate::types::{Identifier, Timestamp};

/// Outcome of a traversal.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ResultSet {
    /// Node revisions, in traversal order.
    Nodes(Vec<Arc<Node>>),
    /// Edge revisions, in traversal order.
    Edges(Vec<Arc<Edge>>),
    /// Metric series keyed by node identifier, or `Aggregated`.
    Metrics(MetricSet),
    /// A folded record; `None` when there was nothing to fold.
    Metric(Option<InterfaceMetric>),
    /// Result of `Count()`.
    Count(usize),
}

impl ResultSet {
    /// Kind of the result.
    pub fn kind(&self) -> SetKind {
        match self {
            ResultSet::Nodes(_) => SetKind::Nodes,
            ResultSet::Edges(_) => SetKind::Edges,
            ResultSet::Metrics(_) => SetKind::Metrics,
            ResultSet::Metric(_) => SetKind::Metric,
            ResultSet::Count(_) => SetKind::Count,
        }
    }

    /// Number of elements; metric sets count records.
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Nodes(v) => v.len(),
            ResultSet::Edges(v) => v.len(),
            ResultSet::Metrics(set) => set.values().map(Vec::len).sum(),
            ResultSet::Metric(m) => usize::from(m.is_some()),
            ResultSet::Count(n) => *n,
        }
    }

    /// Returns true when [`ResultSet::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Evaluation environment of one traversal.
pub(crate) struct Executor<'a> {
    pub(crate) view: &'a dyn GraphView,
    pub(crate) window: (Timestamp, Timestamp),
    pub(crate) metrics: &'a MetricStore,
    pub(crate) indexers: &'a [Arc<MetadataIndexer>],
    pub(crate) default_bucket_secs: Option<i64>,
}

impl Executor<'_> {
    pub(crate) fn run(&self, traversal: &Traversal) -> Result<ResultSet, QueryError> {
        let mut current = ResultSet::Nodes(Vec::new());
        let steps = &traversal.steps;
        for (idx, step) in steps.iter().enumerate() {
            current = match (step, current) {
                (Step::Context(_), set) => set,
                (Step::V(id), _) => ResultSet::Nodes(self.seed(id.as_ref(), steps.get(idx + 1))),
                (Step::Has(filter), ResultSet::Nodes(nodes)) => ResultSet::Nodes(
                    nodes
                        .into_iter()
                        .filter(|n| filter.matches(&n.metadata))
                        .collect(),
                ),
                (Step::Has(filter), ResultSet::Edges(edges)) => ResultSet::Edges(
                    edges
                        .into_iter()
                        .filter(|e| filter.matches(&e.metadata))
                        .collect(),
                ),
                (Step::Neighbours(dir, filter), ResultSet::Nodes(nodes)) => {
                    ResultSet::Nodes(self.neighbours(&nodes, *dir, filter))
                }
                (Step::Edges(dir, filter), ResultSet::Nodes(nodes)) => {
                    ResultSet::Edges(self.incident(&nodes, *dir, filter))
                }
                (Step::Endpoints(dir, filter), ResultSet::Edges(edges)) => {
                    ResultSet::Nodes(self.endpoints(&edges, *dir, filter))
                }
                (Step::Dedup, ResultSet::Nodes(nodes)) => {
                    ResultSet::Nodes(dedup_by_id(nodes, |n| &n.id))
                }
                (Step::Dedup, ResultSet::Edges(edges)) => {
                    ResultSet::Edges(dedup_by_id(edges, |e| &e.id))
                }
                (Step::Limit(n), ResultSet::Nodes(mut nodes)) => {
                    nodes.truncate(*n);
                    ResultSet::Nodes(nodes)
                }
                (Step::Limit(n), ResultSet::Edges(mut edges)) => {
                    edges.truncate(*n);
                    ResultSet::Edges(edges)
                }
                (Step::Metrics, ResultSet::Nodes(nodes)) => ResultSet::Metrics(self.series(&nodes)),
                (Step::Aggregates(bucket), ResultSet::Metrics(set)) => {
                    let merged = match bucket.or(self.default_bucket_secs) {
                        Some(secs) => {
                            let width = secs
                                .checked_mul(1_000)
                                .filter(|w| *w > 0)
                                .ok_or_else(|| {
                                    QueryError::bad_argument(
                                        "Aggregates",
                                        format!("bucket width of {secs} seconds is out of range"),
                                    )
                                })?;
                            aggregate::bucketed(&set, width)
                        }
                        None => aggregate::aggregates(&set),
                    };
                    ResultSet::Metrics(aggregate::aggregated_set(merged))
                }
                (Step::Sum, ResultSet::Metrics(set)) => {
                    ResultSet::Metric(aggregate::sum(set.values().flatten()))
                }
                (Step::Count, set @ (ResultSet::Nodes(_) | ResultSet::Edges(_) | ResultSet::Metrics(_))) => {
                    ResultSet::Count(set.len())
                }
                (step, set) => {
                    return Err(QueryError::TypeMismatch {
                        step: step.name(),
                        expected: "a compatible set",
                        found: set.kind().name(),
                    })
                }
            };
            trace!(step = step.name(), size = current.len(), "query.step");
        }
        Ok(current)
    }

    fn seed(&self, id: Option<&Identifier>, next: Option<&Step>) -> Vec<Arc<Node>> {
        if let Some(id) = id {
            return self.view.node_revisions(id);
        }
        if let Some(Step::Has(filter)) = next {
            if let Some(nodes) = self.indexed_seed(filter) {
                return nodes;
            }
        }
        self.view.nodes()
    }

    /// Candidate nodes from a running indexer whose filter and key are
    /// pinned by equality terms of `filter`. Live view only: indexers do
    /// not follow history.
    fn indexed_seed(&self, filter: &ElementFilter) -> Option<Vec<Arc<Node>>> {
        if !self.view.is_live() {
            return None;
        }
        self.indexers.iter().find_map(|indexer| {
            if !indexer.is_running() || !indexer.filter().implied_by(filter) {
                return None;
            }
            let value = filter.equality_on(indexer.key())?;
            trace!(key = indexer.key(), "query.index_seed");
            Some(indexer.lookup(value))
        })
    }

    fn neighbours(
        &self,
        nodes: &[Arc<Node>],
        dir: Direction,
        filter: &ElementFilter,
    ) -> Vec<Arc<Node>> {
        let mut out = Vec::new();
        for node in nodes {
            let mut targets: Vec<Identifier> = Vec::new();
            if matches!(dir, Direction::Out | Direction::Both) {
                targets.extend(self.view.out_edges(&node.id).iter().map(|e| e.child.clone()));
            }
            if matches!(dir, Direction::In | Direction::Both) {
                targets.extend(self.view.in_edges(&node.id).iter().map(|e| e.parent.clone()));
            }
            for target in targets {
                out.extend(
                    self.view
                        .node_revisions(&target)
                        .into_iter()
                        .filter(|n| filter.matches(&n.metadata)),
                );
            }
        }
        out
    }

    fn incident(
        &self,
        nodes: &[Arc<Node>],
        dir: Direction,
        filter: &ElementFilter,
    ) -> Vec<Arc<Edge>> {
        let mut out = Vec::new();
        for node in nodes {
            if matches!(dir, Direction::Out | Direction::Both) {
                out.extend(self.view.out_edges(&node.id));
            }
            if matches!(dir, Direction::In | Direction::Both) {
                out.extend(self.view.in_edges(&node.id));
            }
        }
        out.retain(|e| filter.matches(&e.metadata));
        out
    }

    fn endpoints(
        &self,
        edges: &[Arc<Edge>],
        dir: Direction,
        filter: &ElementFilter,
    ) -> Vec<Arc<Node>> {
        let mut out = Vec::new();
        for edge in edges {
            let ends = match dir {
                Direction::Out => [Some(&edge.child), None],
                Direction::In => [Some(&edge.parent), None],
                Direction::Both => [Some(&edge.parent), Some(&edge.child)],
            };
            for end in ends.into_iter().flatten() {
                out.extend(
                    self.view
                        .node_revisions(end)
                        .into_iter()
                        .filter(|n| filter.matches(&n.metadata)),
                );
            }
        }
        out
    }

    fn series(&self, nodes: &[Arc<Node>]) -> MetricSet {
        let (from, to) = self.window;
        let mut seen = FxHashSet::default();
        let mut set = MetricSet::new();
        for node in nodes {
            if !seen.insert(&node.id) {
                continue;
            }
            let records = self.metrics.records_in(&node.id, from, to);
            if !records.is_empty() {
                set.insert(node.id.to_string(), records);
            }
        }
        set
    }
}

fn dedup_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &Identifier) -> Vec<T> {
    let mut seen: FxHashSet<Identifier> = FxHashSet::default();
    items
        .into_iter()
        .filter(|item| seen.insert(id(item).clone()))
        .collect()
}
