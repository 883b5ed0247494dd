//! Retrieval for the QA assistant
//!
//! Features:
//! - Dense vector search via Qdrant (or an in-memory index for development)
//! - Ollama embeddings
//! - Cohere-compatible HTTP reranking with a lexical fallback
//! - Multi-stage retrieval: candidates → rerank → filter → neighbor expansion → rerank → filter
//! - Order-stable document dedup
//! - Title-then-content lookup

pub mod document_set;
pub mod embeddings;
pub mod inmemory;
pub mod ollama_embeddings;
pub mod reranker;
pub mod retriever;
pub mod title_lookup;
pub mod vector_store;

pub use document_set::{filter_by_relevance, DocumentSet, MergeOrder};
pub use embeddings::HashingEmbedder;
pub use inmemory::InMemoryIndex;
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use reranker::{HttpReranker, HttpRerankerConfig, LexicalReranker, LexicalScorer};
pub use retriever::{RetrievalMode, Retriever, RetrieverConfig};
pub use title_lookup::TitleLookup;
pub use vector_store::{QdrantIndex, VectorDistance, VectorStoreConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for qa_assistant_core::Error {
    fn from(err: RagError) -> Self {
        qa_assistant_core::Error::RetrievalUnavailable(err.to_string())
    }
}
