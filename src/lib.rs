//! Topograph: an in-memory, versioned network-topology graph with a
//! Gremlin-style traversal engine.
//!
//! The [`Graph`] store keeps the live topology behind a read/write lock and
//! records every revision in an append-only history, so traversals can run
//! against the present or against any past instant or interval. Listeners
//! observe mutations synchronously; [`MetadataIndexer`] builds on them to
//! keep secondary indexes, and [`TraversalEngine`] evaluates queries such as
//!
//! ```text
//! g.Context(1479899809, 60).V().Has('Type', 'veth').Out().Metrics().Sum()
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod index;
mod logging;
pub mod metadata;
pub mod query;
pub mod series;
pub mod storage;
pub mod topology;
pub mod types;

pub use cli::TopologyDocument;
pub use config::{ConfigError, TopoConfig};
pub use index::{IndexKey, MetadataIndexer};
pub use logging::init_logging;
pub use metadata::{ElementFilter, Metadata, MetadataPatch, Predicate, Value};
pub use query::{
    parse, EngineOptions, QueryError, QueryErrorWithCode, ResultSet, Traversal, TraversalBuilder,
    TraversalEngine,
};
pub use series::{InterfaceMetric, MetricSet, MetricStore};
pub use storage::{
    Edge, Graph, GraphEvent, GraphListener, GraphOptions, GraphReader, GraphView, GraphWriter,
    ListenerError, ListenerId, Node, Projection,
};
pub use types::{Clock, EntityKind, Identifier, ManualClock, Result, SystemClock, Timestamp, TopoError};
