#![forbid(unsafe_code)]

//! Traversal query language: parsing, checking, and evaluation.
//!
//! A query is a chain of steps such as
//! `g.Context(1479899184000, 60).V().Has("Type", "netns").Out().Metrics()`.
//! Chains are checked for step placement and result kinds before the graph
//! is touched, then evaluated under the graph's shared lock against either
//! the live state or a projection rebuilt from the history log.

/// Step-chain representation.
pub mod ast;

/// Fluent construction of step chains.
pub mod builder;

mod engine;

/// Query error taxonomy.
pub mod errors;

mod executor;

/// Query text parser.
pub mod parser;

pub use ast::{Direction, SetKind, Step, Traversal};
pub use builder::TraversalBuilder;
pub use engine::{EngineOptions, TraversalEngine};
pub use errors::{QueryError, QueryErrorWithCode};
pub use executor::ResultSet;
pub use parser::parse;
