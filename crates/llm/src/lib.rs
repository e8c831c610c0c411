//! Language-model integration
//!
//! One backend: the Anthropic Messages API over `reqwest`. The retrieval
//! pipeline only ever needs single-shot prompt completions with usage
//! accounting, exposed through the `LanguageModel` trait from core.

pub mod backend;

pub use backend::{AnthropicBackend, AnthropicConfig};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for memsearch_core::SearchError {
    fn from(err: LlmError) -> Self {
        memsearch_core::SearchError::Llm(err.to_string())
    }
}
