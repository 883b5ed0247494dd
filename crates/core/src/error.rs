//! Error taxonomy shared by every crate in the workspace
//!
//! Crate-local errors (`RagError`, `LlmError`, ...) convert into this type at
//! crate boundaries so the pipeline can decide how to recover.

use thiserror::Error;

/// Workspace-wide error
#[derive(Error, Debug)]
pub enum Error {
    /// Embedding, vector index or reranker failed. Never retried within a turn.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Classifier output could not be mapped to a known intent
    #[error("Ambiguous classification: {0}")]
    ClassificationAmbiguous(String),

    /// Term-similarity model could not be built over the stored turns
    #[error("History inconsistent: {0}")]
    HistoryInconsistent(String),

    /// Language model failed to produce an answer
    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the pipeline may recover from this error without surfacing it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RetrievalUnavailable(_)
                | Error::ClassificationAmbiguous(_)
                | Error::HistoryInconsistent(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
