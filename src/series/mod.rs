//! Interface metric series attached to nodes, and their reductions.

pub mod aggregate;
mod record;
mod store;

pub use aggregate::{MetricSet, AGGREGATED_KEY, MAX_BUCKET_SECS};
pub use record::InterfaceMetric;
pub use store::MetricStore;
