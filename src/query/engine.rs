use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

use super::ast::{SetKind, Traversal};
use super::errors::QueryError;
use super::executor::{Executor, ResultSet};
use super::parser::parse;
use crate::index::MetadataIndexer;
use crate::series::{InterfaceMetric, MetricSet, MetricStore, MAX_BUCKET_SECS};
use crate::storage::{Edge, Graph, GraphView, Node};
use crate::types::{Result, Timestamp, TopoError};

/// Tuning knobs of the traversal engine.
#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    /// Bucket width applied by `Aggregates()` when the step names none.
    /// `None` merges without bucketing.
    pub aggregate_bucket_secs: Option<i64>,
}

impl EngineOptions {
    /// Sets the default `Aggregates()` bucket width. Widths outside
    /// `1..=MAX_BUCKET_SECS` disable bucketing.
    pub fn aggregate_bucket_secs(mut self, secs: Option<i64>) -> Self {
        self.aggregate_bucket_secs = secs.filter(|s| (1..=MAX_BUCKET_SECS).contains(s));
        self
    }
}

/// Client entry point: parses queries and evaluates them against a graph,
/// its metric store, and any registered indexers.
///
/// Each evaluation holds the graph's shared lock for the whole chain, so a
/// query observes either all or none of a concurrent mutation.
pub struct TraversalEngine {
    graph: Arc<Graph>,
    metrics: Arc<MetricStore>,
    indexers: RwLock<Vec<Arc<MetadataIndexer>>>,
    options: EngineOptions,
}

impl TraversalEngine {
    /// Creates an engine over `graph` and `metrics`.
    pub fn new(graph: Arc<Graph>, metrics: Arc<MetricStore>) -> Self {
        Self {
            graph,
            metrics,
            indexers: RwLock::new(Vec::new()),
            options: EngineOptions::default(),
        }
    }

    /// Replaces the engine options.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Graph the engine evaluates against.
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Metric store the engine reads series from.
    pub fn metric_store(&self) -> &Arc<MetricStore> {
        &self.metrics
    }

    /// Makes an indexer available for seeding `V().Has(...)` chains.
    pub fn register_indexer(&self, indexer: Arc<MetadataIndexer>) {
        self.indexers.write().push(indexer);
    }

    /// Parses and evaluates `query`.
    pub fn execute(&self, query: &str) -> Result<ResultSet> {
        let traversal = parse(query)?;
        self.run(&traversal)
    }

    /// Evaluates an already parsed chain.
    pub fn run(&self, traversal: &Traversal) -> Result<ResultSet> {
        traversal.check()?;
        let started = Instant::now();
        let indexers = self.indexers.read().clone();
        let reader = self.graph.read();
        let result = match traversal.window(self.graph.now()) {
            None => self.evaluate(
                &*reader,
                (Timestamp::MIN, Timestamp::MAX),
                &indexers,
                traversal,
            ),
            Some((from, to)) => {
                let projection = if from == to {
                    reader.projection_at(to)
                } else {
                    reader.projection_between(from, to)
                };
                self.evaluate(&projection, (from, to), &indexers, traversal)
            }
        }?;
        debug!(
            query = %traversal,
            kind = result.kind().name(),
            size = result.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "query.executed"
        );
        Ok(result)
    }

    fn evaluate(
        &self,
        view: &dyn GraphView,
        window: (Timestamp, Timestamp),
        indexers: &[Arc<MetadataIndexer>],
        traversal: &Traversal,
    ) -> std::result::Result<ResultSet, QueryError> {
        Executor {
            view,
            window,
            metrics: &self.metrics,
            indexers,
            default_bucket_secs: self.options.aggregate_bucket_secs,
        }
        .run(traversal)
    }

    /// Node revisions selected by `query`.
    pub fn get_nodes(&self, query: &str) -> Result<Vec<Arc<Node>>> {
        match self.execute(query)? {
            ResultSet::Nodes(nodes) => Ok(nodes),
            other => Err(mismatch("nodes", &other)),
        }
    }

    /// First node selected by `query`; fails when nothing matches.
    pub fn get_node(&self, query: &str) -> Result<Arc<Node>> {
        self.get_nodes(query)?
            .into_iter()
            .next()
            .ok_or_else(|| TopoError::NoMatch {
                query: query.to_owned(),
            })
    }

    /// Edge revisions selected by `query`.
    pub fn get_edges(&self, query: &str) -> Result<Vec<Arc<Edge>>> {
        match self.execute(query)? {
            ResultSet::Edges(edges) => Ok(edges),
            other => Err(mismatch("edges", &other)),
        }
    }

    /// Metric series selected by `query`.
    pub fn get_metrics(&self, query: &str) -> Result<MetricSet> {
        match self.execute(query)? {
            ResultSet::Metrics(set) => Ok(set),
            other => Err(mismatch("metrics", &other)),
        }
    }

    /// Folded metric selected by `query`; fails when there was nothing to
    /// fold.
    pub fn get_metric(&self, query: &str) -> Result<InterfaceMetric> {
        match self.execute(query)? {
            ResultSet::Metric(Some(metric)) => Ok(metric),
            ResultSet::Metric(None) => Err(TopoError::NoMatch {
                query: query.to_owned(),
            }),
            other => Err(mismatch("metric", &other)),
        }
    }

    /// Size of the result of `query`, or the value of a final `Count()`.
    pub fn count(&self, query: &str) -> Result<usize> {
        Ok(self.execute(query)?.len())
    }
}

fn mismatch(expected: &'static str, found: &ResultSet) -> TopoError {
    let found: SetKind = found.kind();
    TopoError::Query(QueryError::TypeMismatch {
        step: "result",
        expected,
        found: found.name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;
    use crate::metadata::ElementFilter;
    use crate::storage::GraphOptions;
    use crate::types::ManualClock;

    fn engine() -> (TraversalEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let graph = Graph::new(GraphOptions::new().clock(clock.clone()));
        let a = graph
            .new_node("a", "h", metadata! { "Type" => "host", "Name" => "a" })
            .unwrap();
        let b = graph
            .new_node("b", "h", metadata! { "Type" => "veth", "Name" => "b" })
            .unwrap();
        graph
            .new_edge("ab", &a.id, &b.id, metadata! { "RelationType" => "ownership" })
            .unwrap();
        graph
            .new_edge("ab2", &a.id, &b.id, metadata! { "RelationType" => "layer2" })
            .unwrap();
        (
            TraversalEngine::new(graph, Arc::new(MetricStore::new())),
            clock,
        )
    }

    #[test]
    fn out_and_dedup() {
        let (engine, _) = engine();
        let nodes = engine.get_nodes(r#"g.V().Has("Name", "a").Out()"#).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.id.as_str() == "b"));
        assert_eq!(engine.count(r#"g.V().Has("Name", "a").Out().Dedup()"#).unwrap(), 1);
        assert_eq!(engine.count(r#"g.V().Count()"#).unwrap(), 2);
    }

    #[test]
    fn edge_steps_filter_edges() {
        let (engine, _) = engine();
        let edges = engine
            .get_edges(r#"g.V("a").OutE("RelationType", "layer2")"#)
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id.as_str(), "ab2");
        let parent = engine
            .get_node(r#"g.V("b").InE().Has("RelationType", "ownership").InV()"#)
            .unwrap();
        assert_eq!(parent.id.as_str(), "a");
    }

    #[test]
    fn accessors_report_mismatch_and_no_match() {
        let (engine, _) = engine();
        let err = engine.get_edges("g.V()").unwrap_err();
        assert!(matches!(err, TopoError::Query(ref q) if q.is_type_error()));
        let err = engine.get_node(r#"g.V().Has("Name", "zzz")"#).unwrap_err();
        assert!(err.is_not_found());
        let err = engine.execute("g.V().Bogus()").unwrap_err();
        assert!(matches!(err, TopoError::Query(QueryError::UnknownStep { .. })));
    }

    #[test]
    fn past_context_sees_deleted_node() {
        let (engine, clock) = engine();
        clock.set(2_000);
        engine.graph().del_node(&"b".into()).unwrap();
        assert_eq!(engine.count(r#"g.V().Has("Name", "b")"#).unwrap(), 0);
        assert_eq!(engine.count(r#"g.Context(1500).V().Has("Name", "b")"#).unwrap(), 1);
        assert_eq!(engine.count(r#"g.Context(1500).V("a").Out().Dedup()"#).unwrap(), 1);
        assert_eq!(engine.count(r#"g.Context("NOW").V()"#).unwrap(), 1);
    }

    #[test]
    fn index_seed_returns_same_answer() {
        let (engine, _) = engine();
        let indexer = MetadataIndexer::new(
            engine.graph().clone(),
            ElementFilter::new().with("Type", "host"),
            "Name",
        );
        indexer.start();
        engine.register_indexer(indexer);
        let q = r#"g.V().Has("Type", "host", "Name", "a").Out().Dedup()"#;
        assert_eq!(engine.count(q).unwrap(), 1);
        engine
            .graph()
            .new_node("c", "h", metadata! { "Type" => "host", "Name" => "a" })
            .unwrap();
        assert_eq!(engine.count(r#"g.V().Has("Type", "host", "Name", "a")"#).unwrap(), 2);
    }
}
