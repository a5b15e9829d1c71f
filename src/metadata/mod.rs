//! Loosely typed metadata documents: values, dot-path resolution, patches,
//! and filters.

pub mod filter;
pub mod path;
mod patch;
mod value;

pub use filter::{ElementFilter, Predicate};
pub use patch::{MetadataPatch, PatchOp};
pub use value::{Metadata, Value};
