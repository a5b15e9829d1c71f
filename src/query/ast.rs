//! Step-chain representation of traversal queries.
//!
//! A [`Traversal`] is produced either by the text parser or by
//! [`super::TraversalBuilder`]; both go through [`Traversal::check`] so the
//! executor only ever sees well-formed, well-typed chains.

use std::fmt;

use crate::metadata::{ElementFilter, Predicate, Value};
use crate::types::{Identifier, Timestamp};

use super::errors::QueryError;

/// Instant a time context is anchored at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeAnchor {
    /// Evaluation time, read from the graph clock.
    Now,
    /// Unix milliseconds.
    At(Timestamp),
}

/// `Context(t)` or `Context(t, span)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextSpec {
    /// End of the window.
    pub anchor: TimeAnchor,
    /// Window length in seconds; zero for a point in time.
    pub span_secs: i64,
}

impl ContextSpec {
    /// Resolves the window `[from, to]` given the current time.
    pub fn window(&self, now: Timestamp) -> (Timestamp, Timestamp) {
        let to = match self.anchor {
            TimeAnchor::Now => now,
            TimeAnchor::At(t) => t,
        };
        let from = to.saturating_sub(self.span_secs.saturating_mul(1_000));
        (from, to)
    }
}

/// Direction of an edge-following step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Parent to child.
    Out,
    /// Child to parent.
    In,
    /// Either way.
    Both,
}

/// One step of a traversal.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Time context.
    Context(ContextSpec),
    /// Seed with every node of the active projection, or one identifier.
    V(Option<Identifier>),
    /// Keep elements matching every term.
    Has(ElementFilter),
    /// Follow edges to neighbour nodes matching the filter.
    Neighbours(Direction, ElementFilter),
    /// Yield incident edges matching the filter.
    Edges(Direction, ElementFilter),
    /// From edges, yield endpoint nodes matching the filter.
    Endpoints(Direction, ElementFilter),
    /// Unique by identifier, first-seen order.
    Dedup,
    /// Per-node metric series intersecting the context window.
    Metrics,
    /// Merge series into one; an optional bucket width in seconds sums
    /// records sharing a bucket.
    Aggregates(Option<i64>),
    /// Fold a metric set into one record.
    Sum,
    /// Number of elements.
    Count,
    /// First `n` elements.
    Limit(usize),
}

/// Kind of value flowing between steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetKind {
    /// Nothing seeded yet.
    Unseeded,
    /// Node revisions.
    Nodes,
    /// Edge revisions.
    Edges,
    /// Metric series keyed by node.
    Metrics,
    /// A single metric record.
    Metric,
    /// A count.
    Count,
}

impl SetKind {
    /// Lower-case name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            SetKind::Unseeded => "nothing",
            SetKind::Nodes => "nodes",
            SetKind::Edges => "edges",
            SetKind::Metrics => "metrics",
            SetKind::Metric => "metric",
            SetKind::Count => "count",
        }
    }
}

impl Step {
    /// Step name as written in query text.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Context(_) => "Context",
            Step::V(_) => "V",
            Step::Has(f) if is_has_key(f) => "HasKey",
            Step::Has(_) => "Has",
            Step::Neighbours(Direction::Out, _) => "Out",
            Step::Neighbours(Direction::In, _) => "In",
            Step::Neighbours(Direction::Both, _) => "Both",
            Step::Edges(Direction::Out, _) => "OutE",
            Step::Edges(Direction::In, _) => "InE",
            Step::Edges(Direction::Both, _) => "BothE",
            Step::Endpoints(Direction::Out, _) => "OutV",
            Step::Endpoints(Direction::In, _) => "InV",
            Step::Endpoints(Direction::Both, _) => "BothV",
            Step::Dedup => "Dedup",
            Step::Metrics => "Metrics",
            Step::Aggregates(_) => "Aggregates",
            Step::Sum => "Sum",
            Step::Count => "Count",
            Step::Limit(_) => "Limit",
        }
    }

    /// Result kind of applying this step to `input`, or the type error.
    pub fn output(&self, input: SetKind) -> Result<SetKind, QueryError> {
        let expect = |ok: bool, expected: &'static str, out: SetKind| {
            if ok {
                Ok(out)
            } else {
                Err(QueryError::TypeMismatch {
                    step: self.name(),
                    expected,
                    found: input.name(),
                })
            }
        };
        let elements = matches!(input, SetKind::Nodes | SetKind::Edges);
        match self {
            Step::Context(_) => Ok(input),
            Step::V(_) => Ok(SetKind::Nodes),
            Step::Has(_) | Step::Dedup | Step::Limit(_) => expect(elements, "nodes or edges", input),
            Step::Neighbours(..) => expect(input == SetKind::Nodes, "nodes", SetKind::Nodes),
            Step::Edges(..) => expect(input == SetKind::Nodes, "nodes", SetKind::Edges),
            Step::Endpoints(..) => expect(input == SetKind::Edges, "edges", SetKind::Nodes),
            Step::Metrics => expect(input == SetKind::Nodes, "nodes", SetKind::Metrics),
            Step::Aggregates(_) => expect(input == SetKind::Metrics, "metrics", SetKind::Metrics),
            Step::Sum => expect(input == SetKind::Metrics, "metrics", SetKind::Metric),
            Step::Count => expect(
                elements || input == SetKind::Metrics,
                "nodes, edges or metrics",
                SetKind::Count,
            ),
        }
    }
}

fn is_has_key(filter: &ElementFilter) -> bool {
    matches!(filter.terms(), [(_, Predicate::Exists)])
}

/// A complete step chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Traversal {
    /// Steps in evaluation order.
    pub steps: Vec<Step>,
}

impl Traversal {
    /// Wraps a step list without checking it.
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Validates placement and typing of every step and returns the final
    /// result kind.
    ///
    /// Time contexts must come before `V()`, which must appear exactly once
    /// and before any other step. Each step must accept the kind produced
    /// by its predecessor.
    pub fn check(&self) -> Result<SetKind, QueryError> {
        let mut kind = SetKind::Unseeded;
        for step in &self.steps {
            match (step, kind) {
                (Step::Context(_), SetKind::Unseeded) => continue,
                (Step::Context(_), _) => return Err(QueryError::ContextAfterSeed),
                (Step::V(_), SetKind::Unseeded) => {}
                (Step::V(_), _) => return Err(QueryError::DuplicateSeed),
                (other, SetKind::Unseeded) => {
                    return Err(QueryError::MissingSeed { step: other.name() })
                }
                _ => {}
            }
            kind = step.output(kind)?;
        }
        if kind == SetKind::Unseeded {
            return Err(QueryError::MissingSeed { step: "g" });
        }
        Ok(kind)
    }

    /// Time contexts of the chain, in order.
    pub fn contexts(&self) -> impl Iterator<Item = &ContextSpec> {
        self.steps.iter().filter_map(|s| match s {
            Step::Context(c) => Some(c),
            _ => None,
        })
    }

    /// Resolves the active window: `None` for the live graph, otherwise the
    /// intersection of every declared context.
    pub fn window(&self, now: Timestamp) -> Option<(Timestamp, Timestamp)> {
        self.contexts().fold(None, |acc, ctx| {
            let (from, to) = ctx.window(now);
            Some(match acc {
                None => (from, to),
                Some((f, t)) => (f.max(from), t.min(to)),
            })
        })
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "{s:?}"),
        Value::List(items) => {
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write_literal(f, item)?;
            }
            Ok(())
        }
        other => write!(f, "{other}"),
    }
}

fn write_filter(f: &mut fmt::Formatter<'_>, filter: &ElementFilter) -> fmt::Result {
    for (idx, (path, predicate)) in filter.terms().iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{path:?}")?;
        match predicate {
            Predicate::Exists => {}
            Predicate::Eq(v) => {
                f.write_str(", ")?;
                write_literal(f, v)?;
            }
            Predicate::Ne(v) => {
                f.write_str(", Ne(")?;
                write_literal(f, v)?;
                f.write_str(")")?;
            }
            Predicate::Within(vs) | Predicate::Without(vs) => {
                let name = if matches!(predicate, Predicate::Within(_)) {
                    "Within"
                } else {
                    "Without"
                };
                write!(f, ", {name}(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, v)?;
                }
                f.write_str(")")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        match self {
            Step::Context(ctx) => {
                match ctx.anchor {
                    TimeAnchor::Now => f.write_str("\"NOW\"")?,
                    TimeAnchor::At(t) => write!(f, "{t}")?,
                }
                if ctx.span_secs != 0 {
                    write!(f, ", {}", ctx.span_secs)?;
                }
            }
            Step::V(Some(id)) => write!(f, "{:?}", id.as_str())?,
            Step::Has(filter)
            | Step::Neighbours(_, filter)
            | Step::Edges(_, filter)
            | Step::Endpoints(_, filter) => write_filter(f, filter)?,
            Step::Aggregates(Some(bucket)) => write!(f, "{bucket}")?,
            Step::Limit(n) => write!(f, "{n}")?,
            _ => {}
        }
        f.write_str(")")
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("g")?;
        for step in &self.steps {
            write!(f, ".{step}")?;
        }
        Ok(())
    }
}
