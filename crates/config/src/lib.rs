//! Configuration management for the QA assistant
//!
//! Supports loading configuration from:
//! - TOML/YAML/JSON files under `config/`
//! - Environment variables (QA_ASSISTANT_ prefix, `__` between nested keys)
//!
//! Every section has defaults, so an empty environment yields a usable
//! development setup pointing at local Ollama and Qdrant.

pub mod constants;
pub mod pipeline;
pub mod retrieval;
pub mod settings;

pub use pipeline::{HistoryConfig, LlmConfig, PipelineConfig};
pub use retrieval::{
    EmbeddingConfig, RerankerBackend, RerankerConfig, RetrievalConfig, RetrievalThresholds,
    VectorBackend, VectorDistanceKind, VectorStoreConfig,
};
pub use settings::{
    load_settings, load_settings_from, ObservabilityConfig, RuntimeEnvironment, ServerConfig,
    Settings,
};

use thiserror::Error;

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

    #[error("Environment error: {0}")]
    Environment(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingField(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}

impl From<ConfigError> for qa_assistant_core::Error {
    fn from(err: ConfigError) -> Self {
        qa_assistant_core::Error::Config(err.to_string())
    }
}
