use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigError;

/// Installs the global `tracing` subscriber with the given filter
/// directive (for example `warn` or `topograph::query=debug`).
pub fn init_logging(filter: &str) -> Result<(), ConfigError> {
    fmt()
        .with_env_filter(EnvFilter::try_new(filter).map_err(|e| ConfigError::LogFilter {
            filter: filter.to_string(),
            message: e.to_string(),
        })?)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| ConfigError::LoggingInitialized)
}
