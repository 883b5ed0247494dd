//! LLM integration
//!
//! - Ollama chat backend with retries and NDJSON streaming
//! - Prompt templates for each answer branch, the intent classifier and
//!   the query rewriter

pub mod backend;
pub mod prompt;

pub use backend::{OllamaBackend, OllamaConfig};
pub use prompt::{format_documents, format_transcript, PromptBuilder, Templates};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for qa_assistant_core::Error {
    fn from(err: LlmError) -> Self {
        qa_assistant_core::Error::GenerationFailure(err.to_string())
    }
}
