//! Shared identifiers, timestamps, clocks, and the crate-wide error type.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::QueryError;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TopoError>;

/// Opaque, globally unique identifier of a node or an edge.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(pub String);

impl Identifier {
    /// Creates an identifier from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a random 128-bit identifier rendered as 32 hex digits.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier(value.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier(value)
    }
}

impl From<&Identifier> for Identifier {
    fn from(value: &Identifier) -> Self {
        value.clone()
    }
}

/// Source of mutation timestamps.
pub trait Clock: Send + Sync {
    /// Current time in Unix milliseconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now_millis()
    }
}

/// Manually driven clock used by tests and replay tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::SeqCst);
    }

    /// Advances the clock by `millis` and returns the new time.
    pub fn advance(&self, millis: i64) -> Timestamp {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> Timestamp {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as Timestamp
}

/// Kind of graph entity, used in error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A graph node.
    Node,
    /// A graph edge.
    Edge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => f.write_str("node"),
            EntityKind::Edge => f.write_str("edge"),
        }
    }
}

/// Errors surfaced by the graph store, indexers, and the query engine.
#[derive(Debug, Error)]
pub enum TopoError {
    /// A lookup that required a result matched nothing.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Entity kind that was looked up.
        kind: EntityKind,
        /// Identifier that was looked up.
        id: Identifier,
    },
    /// A query that required exactly one result matched nothing.
    #[error("query matched nothing: {query}")]
    NoMatch {
        /// Query text.
        query: String,
    },
    /// An identifier that was deleted earlier was presented for creation.
    #[error("{kind} identifier '{id}' was retired and cannot be reused")]
    IdentifierRetired {
        /// Entity kind.
        kind: EntityKind,
        /// Retired identifier.
        id: Identifier,
    },
    /// One or more listeners failed; the mutation itself was committed.
    #[error("mutation of {kind} '{id}' committed but {} listener(s) failed: {}", failures.len(), failures.join("; "))]
    ListenerFailed {
        /// Entity kind of the mutation.
        kind: EntityKind,
        /// Entity identifier of the mutation.
        id: Identifier,
        /// Failure messages in dispatch order.
        failures: Vec<String>,
    },
    /// Metric records must be appended against a known node.
    #[error("metric record rejected: {0}")]
    InvalidMetric(&'static str),
    /// Query parsing or evaluation failure.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// I/O failure (CLI and document loading).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TopoError {
    /// Shorthand for a missing node.
    pub fn node_not_found(id: &Identifier) -> Self {
        TopoError::NotFound {
            kind: EntityKind::Node,
            id: id.clone(),
        }
    }

    /// Shorthand for a missing edge.
    pub fn edge_not_found(id: &Identifier) -> Self {
        TopoError::NotFound {
            kind: EntityKind::Edge,
            id: id.clone(),
        }
    }

    /// Returns true for the not-found family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TopoError::NotFound { .. } | TopoError::NoMatch { .. })
    }
}
