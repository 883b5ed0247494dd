//! Core traits and types for the QA assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Documents and conversation turns
//! - Intent labels and answer records
//! - LLM request/response types
//! - Collaborator traits (embeddings, vector index, reranker, LLM)
//! - Error taxonomy

pub mod answer;
pub mod conversation;
pub mod document;
pub mod error;
pub mod intent;
pub mod llm_types;
pub mod traits;

pub use answer::AnswerRecord;
pub use conversation::{Turn, TurnRole};
pub use document::Document;
pub use error::{Error, Result};
pub use intent::{Intent, Signature};
pub use llm_types::{
    FinishReason, GenerateRequest, GenerateResponse, Message, Role, StreamChunk, TokenUsage,
};

pub use traits::{EmbeddingService, LanguageModel, Reranker, VectorIndex};
