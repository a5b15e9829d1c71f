#![forbid(unsafe_code)]

//! Support code for the `topograph` binary: loading and capturing topology
//! documents.

/// JSON topology documents.
pub mod document;

pub use document::{EdgeDoc, LoadSummary, NodeDoc, TopologyDocument};
