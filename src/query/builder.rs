//! Fluent traversal builder.

use crate::metadata::{ElementFilter, Predicate};
use crate::types::{Identifier, Timestamp};

use super::ast::{ContextSpec, Direction, Step, TimeAnchor, Traversal};
use super::errors::QueryError;

/// Programmatic counterpart of the query text.
///
/// ```
/// use topograph::query::TraversalBuilder;
///
/// let chain = TraversalBuilder::new()
///     .v()
///     .has("Type", "netns")
///     .has("Name", "im")
///     .out_where(|f| f.with("Name", "lo"))
///     .metrics()
///     .aggregates()
///     .sum()
///     .build()
///     .unwrap();
/// assert_eq!(
///     chain.to_string(),
///     r#"g.V().Has("Type", "netns", "Name", "im").Out("Name", "lo").Metrics().Aggregates().Sum()"#
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct TraversalBuilder {
    steps: Vec<Step>,
}

impl TraversalBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Evaluates against the graph as it was at `at`.
    pub fn context(self, at: Timestamp) -> Self {
        self.push(Step::Context(ContextSpec {
            anchor: TimeAnchor::At(at),
            span_secs: 0,
        }))
    }

    /// Evaluates against every revision valid in `[at - span_secs, at]`.
    pub fn context_span(self, at: Timestamp, span_secs: i64) -> Self {
        self.push(Step::Context(ContextSpec {
            anchor: TimeAnchor::At(at),
            span_secs,
        }))
    }

    /// Evaluates against the graph as it is at evaluation time, read
    /// through the history log.
    pub fn context_now(self) -> Self {
        self.push(Step::Context(ContextSpec {
            anchor: TimeAnchor::Now,
            span_secs: 0,
        }))
    }

    /// Seeds with every node.
    pub fn v(self) -> Self {
        self.push(Step::V(None))
    }

    /// Seeds with one node.
    pub fn v_id(self, id: impl Into<Identifier>) -> Self {
        self.push(Step::V(Some(id.into())))
    }

    /// Adds a term to the preceding `Has` step, or starts one.
    pub fn has(mut self, key: impl Into<String>, predicate: impl Into<Predicate>) -> Self {
        if let Some(Step::Has(filter)) = self.steps.last_mut() {
            if !matches!(filter.terms(), [(_, Predicate::Exists)]) {
                *filter = std::mem::take(filter).with(key, predicate);
                return self;
            }
        }
        self.push(Step::Has(ElementFilter::new().with(key, predicate)))
    }

    /// Keeps elements carrying `key`.
    pub fn has_key(self, key: impl Into<String>) -> Self {
        self.push(Step::Has(ElementFilter::new().with(key, Predicate::Exists)))
    }

    /// Follows outgoing edges.
    pub fn out(self) -> Self {
        self.push(Step::Neighbours(Direction::Out, ElementFilter::new()))
    }

    /// Follows outgoing edges to nodes matching the filter built by `f`.
    pub fn out_where(self, f: impl FnOnce(ElementFilter) -> ElementFilter) -> Self {
        self.push(Step::Neighbours(Direction::Out, f(ElementFilter::new())))
    }

    /// Follows incoming edges.
    pub fn in_(self) -> Self {
        self.push(Step::Neighbours(Direction::In, ElementFilter::new()))
    }

    /// Follows incoming edges to nodes matching the filter built by `f`.
    pub fn in_where(self, f: impl FnOnce(ElementFilter) -> ElementFilter) -> Self {
        self.push(Step::Neighbours(Direction::In, f(ElementFilter::new())))
    }

    /// Follows edges either way.
    pub fn both(self) -> Self {
        self.push(Step::Neighbours(Direction::Both, ElementFilter::new()))
    }

    /// Follows edges either way to nodes matching the filter built by `f`.
    pub fn both_where(self, f: impl FnOnce(ElementFilter) -> ElementFilter) -> Self {
        self.push(Step::Neighbours(Direction::Both, f(ElementFilter::new())))
    }

    /// Yields incident edges in `direction` matching `filter`.
    pub fn edges(self, direction: Direction, filter: ElementFilter) -> Self {
        self.push(Step::Edges(direction, filter))
    }

    /// Yields outgoing edges.
    pub fn out_e(self) -> Self {
        self.edges(Direction::Out, ElementFilter::new())
    }

    /// Yields incoming edges.
    pub fn in_e(self) -> Self {
        self.edges(Direction::In, ElementFilter::new())
    }

    /// Yields edges in both directions.
    pub fn both_e(self) -> Self {
        self.edges(Direction::Both, ElementFilter::new())
    }

    /// From edges, yields endpoints in `direction` matching `filter`.
    pub fn endpoints(self, direction: Direction, filter: ElementFilter) -> Self {
        self.push(Step::Endpoints(direction, filter))
    }

    /// From edges, yields children.
    pub fn out_v(self) -> Self {
        self.endpoints(Direction::Out, ElementFilter::new())
    }

    /// From edges, yields parents.
    pub fn in_v(self) -> Self {
        self.endpoints(Direction::In, ElementFilter::new())
    }

    /// From edges, yields both endpoints.
    pub fn both_v(self) -> Self {
        self.endpoints(Direction::Both, ElementFilter::new())
    }

    /// Removes duplicates by identifier.
    pub fn dedup(self) -> Self {
        self.push(Step::Dedup)
    }

    /// Switches to metric series.
    pub fn metrics(self) -> Self {
        self.push(Step::Metrics)
    }

    /// Merges metric series.
    pub fn aggregates(self) -> Self {
        self.push(Step::Aggregates(None))
    }

    /// Merges metric series, summing records within `bucket_secs` slots.
    pub fn aggregates_every(self, bucket_secs: i64) -> Self {
        self.push(Step::Aggregates(Some(bucket_secs)))
    }

    /// Folds metric series into one record.
    pub fn sum(self) -> Self {
        self.push(Step::Sum)
    }

    /// Counts elements.
    pub fn count(self) -> Self {
        self.push(Step::Count)
    }

    /// Keeps the first `n` elements.
    pub fn limit(self, n: usize) -> Self {
        self.push(Step::Limit(n))
    }

    /// Checks and returns the chain.
    pub fn build(self) -> Result<Traversal, QueryError> {
        let traversal = Traversal::new(self.steps);
        traversal.check()?;
        Ok(traversal)
    }
}
