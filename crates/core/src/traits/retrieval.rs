//! Retrieval collaborator traits
//!
//! The vector index and reranker are treated as black boxes: only the
//! contracts below are relied upon.

use async_trait::async_trait;

use crate::{Document, Result};

/// Maps text to a fixed-length vector
#[async_trait]
pub trait EmbeddingService: Send + Sync + 'static {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, one vector per input in input order
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimension of produced vectors
    fn dimension(&self) -> usize;
}

/// Nearest-neighbor store over embedded document chunks
#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    /// Top `k` documents for a text query, most relevant first
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>>;

    /// Top `k` documents near `vector` with their distance, closest first.
    /// Lower distance means more similar.
    async fn similarity_search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>>;

    /// Exact lookup by document id. Unknown ids are skipped.
    async fn get_by_ids(&self, ids: &[u64]) -> Result<Vec<Document>>;

    /// Index name for logging
    fn name(&self) -> &str;
}

/// Query-aware rescoring of a candidate list
#[async_trait]
pub trait Reranker: Send + Sync + 'static {
    /// Return at most `top_n` documents with `relevance_score` attached,
    /// highest score first.
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        top_n: usize,
    ) -> Result<Vec<Document>>;

    /// Reranker name for logging
    fn name(&self) -> &str;
}
