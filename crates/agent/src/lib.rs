//! Conversation agent
//!
//! Features:
//! - Bounded conversation history with TF-IDF follow-up context recovery
//! - LLM intent classification and second-chance query rewriting
//! - Answer branches behind the `BranchHandler` trait
//! - `ConversationPipeline` state machine tying retrieval and generation together

pub mod branch;
pub mod history;
pub mod intent;
pub mod pipeline;
pub mod rewriter;
pub mod tfidf;

pub use branch::{
    BranchContext, BranchHandler, ConversationalBranch, DocumentBranch, FollowupBranch,
    SummaryBranch,
};
pub use history::{ConversationHistory, HistorySnapshot};
pub use intent::IntentClassifier;
pub use pipeline::{ConversationPipeline, PipelineOptions};
pub use rewriter::QueryRewriter;
pub use tfidf::TfIdf;

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("History inconsistent: {0}")]
    HistoryInconsistent(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<qa_assistant_core::Error> for AgentError {
    fn from(err: qa_assistant_core::Error) -> Self {
        use qa_assistant_core::Error;
        match err {
            Error::RetrievalUnavailable(msg) => AgentError::RetrievalUnavailable(msg),
            Error::HistoryInconsistent(msg) => AgentError::HistoryInconsistent(msg),
            Error::GenerationFailure(msg) => AgentError::GenerationFailure(msg),
            other => AgentError::GenerationFailure(other.to_string()),
        }
    }
}

impl From<qa_assistant_llm::LlmError> for AgentError {
    fn from(err: qa_assistant_llm::LlmError) -> Self {
        AgentError::GenerationFailure(err.to_string())
    }
}

impl From<AgentError> for qa_assistant_core::Error {
    fn from(err: AgentError) -> Self {
        use qa_assistant_core::Error;
        match err {
            AgentError::RetrievalUnavailable(msg) => Error::RetrievalUnavailable(msg),
            AgentError::HistoryInconsistent(msg) => Error::HistoryInconsistent(msg),
            AgentError::GenerationFailure(msg) => Error::GenerationFailure(msg),
            AgentError::Cancelled => Error::GenerationFailure("cancelled".to_string()),
        }
    }
}
