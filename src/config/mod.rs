//! Application configuration.
//!
//! Compiled-in defaults cover everything the pipeline needs. A YAML file is
//! read only when named by `--config` or `WORD_SPLITTER_CONFIG`;
//! `WORD_SPLITTER__*` environment variables override any value. Command-line
//! arguments are validated here as well so both processes fail fast with a
//! [`ConfigError`].

mod limits;
mod messaging;

use std::path::{Path, PathBuf};

pub use limits::{
    ProcessingLimits, DEFAULT_FLUSH_TIMEOUT, DEFAULT_FORCED_SHUTDOWN_GRACE,
    DEFAULT_MAX_WORD_LENGTH, DEFAULT_POLL_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_WORKER_COUNT,
};
pub use messaging::{
    MessagingConfig, PayloadEncoding, DEFAULT_BOOTSTRAP_SERVERS, DEFAULT_CONSUMER_GROUP_PREFIX,
    DEFAULT_MESSAGE_TIMEOUT_MS,
};

/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "WORD_SPLITTER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "WORD_SPLITTER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "WORD_SPLITTER_LOG";

use serde::Deserialize;

/// Startup configuration errors. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} cannot be empty")]
    EmptyArgument(&'static str),

    #[error("Directory does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Output directory does not exist: {}", .0.display())]
    OutputDirectoryMissing(PathBuf),

    #[error("Cannot resolve {}: {source}", .path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection and serialization.
    pub messaging: MessagingConfig,
    /// Word rules, pool size and timeouts.
    pub limits: ProcessingLimits,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. Compiled-in defaults
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    ///
    /// No file is read unless one is named.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder();

        if let Some(config_path) = path {
            builder = builder.add_source(File::from(config_path).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            limits: ProcessingLimits::for_test(),
            ..Default::default()
        }
    }
}

/// Validate the producer's watch directory and resolve it to an absolute path.
pub fn validate_watch_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyArgument("Watch directory path"));
    }
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path.to_path_buf()));
    }
    path.canonicalize().map_err(|source| ConfigError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate the consumer's topic and output file.
///
/// The output file itself need not exist, but its parent directory must.
pub fn validate_consumer_target(topic: &str, output: &Path) -> Result<(), ConfigError> {
    if topic.trim().is_empty() {
        return Err(ConfigError::EmptyArgument("Topic name"));
    }
    if output.as_os_str().is_empty() {
        return Err(ConfigError::EmptyArgument("Output file path"));
    }
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(ConfigError::OutputDirectoryMissing(parent.to_path_buf()))
        }
        _ => Ok(()),
    }
}
