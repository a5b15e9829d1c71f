//! Live secondary indexes over node metadata.

mod indexer;

pub use indexer::{IndexKey, MetadataIndexer};
