//! Configuration for the memsearch service
//!
//! Layered loading: `config/default.{toml,yaml}` then an optional
//! environment-specific file, then `MEMSEARCH__` environment variables.
//! Every section validates its ranges before the service starts.

mod settings;

pub use settings::{
    load_settings, EmbedderSettings, IndexingSettings, LlmSettings, LoggingSettings,
    MultiQuerySettings, NatsSettings, QdrantSettings, RerankerBackend, RerankerSettings,
    SearchSettings, ServerSettings, SessionRetrievalSettings, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for memsearch_core::SearchError {
    fn from(err: ConfigError) -> Self {
        memsearch_core::SearchError::Config(err.to_string())
    }
}
