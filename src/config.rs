//! TOML configuration shared by the library and the `topograph` binary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::EngineOptions;
use crate::series::MAX_BUCKET_SECS;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "TOPOGRAPH_CONFIG";

/// Output format of query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable listing.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// `tracing-subscriber` filter directive, e.g. `topograph=debug`.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

/// `[graph]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// History older than this many milliseconds may be pruned by the
    /// embedding application. Unset keeps history forever.
    pub history_retention_ms: Option<i64>,
    /// Host label stamped on nodes loaded without one.
    pub default_host: Option<String>,
}

/// `[query]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    /// Default bucket width of `Aggregates()`, in seconds.
    pub aggregate_bucket_secs: Option<i64>,
    /// Default output format of the CLI.
    pub default_format: OutputFormat,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopoConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogSection,
    /// Graph store settings.
    #[serde(default)]
    pub graph: GraphSection,
    /// Query engine settings.
    #[serde(default)]
    pub query: QuerySection,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl TopoConfig {
    /// Loads `explicit`, or the default location when `None`. A missing
    /// file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let mut config = match path.as_ref() {
            Some(p) if p.exists() => read_file(p)?,
            _ => TopoConfig::default(),
        };
        config.validate()?;
        config.path = path;
        Ok(config)
    }

    /// Parses configuration text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: TopoConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// File the configuration was loaded from or will be written to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Engine options derived from the `[query]` section.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::default().aggregate_bucket_secs(self.query.aggregate_bucket_secs)
    }

    /// Serialized TOML form.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    /// Writes the configuration back to its file, creating parent
    /// directories as needed.
    pub fn persist(&self) -> Result<PathBuf, ConfigError> {
        let target = match &self.path {
            Some(path) => path.clone(),
            None => default_config_path().ok_or(ConfigError::NoConfigPath)?,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, self.to_toml()?).map_err(|source| ConfigError::Write {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ms) = self.graph.history_retention_ms {
            if ms <= 0 {
                return Err(ConfigError::Invalid {
                    key: "graph.history_retention_ms",
                    message: format!("must be positive, got {ms}"),
                });
            }
        }
        if let Some(secs) = self.query.aggregate_bucket_secs {
            if !(1..=MAX_BUCKET_SECS).contains(&secs) {
                return Err(ConfigError::Invalid {
                    key: "query.aggregate_bucket_secs",
                    message: format!("must be between 1 and {MAX_BUCKET_SECS}, got {secs}"),
                });
            }
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<TopoConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors raised while loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Serialization failed.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Underlying error.
        source: toml::ser::Error,
    },
    /// The file could not be written.
    #[error("failed to write config {path}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The parent directory could not be created.
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A value is out of range.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Dotted key.
        key: &'static str,
        /// What is wrong.
        message: String,
    },
    /// The log filter directive did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    LogFilter {
        /// Directive as given.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber was already installed.
    #[error("logging already initialized")]
    LoggingInitialized,
    /// No explicit path and no platform config directory.
    #[error("no config directory found; pass --config or set TOPOGRAPH_CONFIG")]
    NoConfigPath,
}

/// Default configuration location: `<config dir>/topograph/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("topograph").join("config.toml"))
}
