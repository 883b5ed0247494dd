//! Multi-stage retriever
//!
//! Stages, each skipped when its input is empty:
//! 1. candidate fetch from the vector index
//! 2. rerank, keeping `rerank_top_n`
//! 3. relevance filter (relaxed by the simplifier in simplified mode)
//! 4. neighbor expansion by embedding distance
//! 5. rerank of the expanded set against the original query
//! 6. relevance filter at the base threshold
//! 7. dedup, ascending by id

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::Instrument;

use qa_assistant_config::{RetrievalConfig, RetrievalThresholds};
use qa_assistant_core::{Document, EmbeddingService, Reranker, Result, VectorIndex};

use crate::document_set::{filter_by_relevance, DocumentSet};

/// Retrieval variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Query as typed by the user
    Standard,
    /// Query produced by a rewrite; first filter uses a relaxed threshold
    Simplified,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Standard => "standard",
            RetrievalMode::Simplified => "simplified",
        }
    }
}

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Candidates fetched by similarity search
    pub candidate_k: usize,
    /// Documents kept by the first rerank
    pub rerank_top_n: usize,
    /// Neighbors looked up per surviving document
    pub neighbor_k: usize,
    pub thresholds: RetrievalThresholds,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrieverConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            candidate_k: config.candidate_k,
            rerank_top_n: config.rerank_top_n,
            neighbor_k: config.neighbor_k,
            thresholds: config.thresholds,
        }
    }
}

/// Vector search + rerank + neighbor expansion behind one `retrieve` call
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingService>,
    reranker: Arc<dyn Reranker>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingService>,
        reranker: Arc<dyn Reranker>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            reranker,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Run the full pipeline. Result is ascending by document id.
    pub async fn retrieve(&self, query: &str, mode: RetrievalMode) -> Result<Vec<Document>> {
        let thresholds = &self.config.thresholds;
        let first_threshold = match mode {
            RetrievalMode::Standard => thresholds.retrieval_threshold,
            RetrievalMode::Simplified => thresholds.simplified_threshold(),
        };

        let candidates = self
            .index
            .similarity_search(query, self.config.candidate_k)
            .instrument(tracing::debug_span!("retrieval.candidates", mode = mode.as_str()))
            .await?;
        tracing::debug!(query, count = candidates.len(), "Candidates fetched");
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let reranked = self
            .reranker
            .rerank(query, candidates, self.config.rerank_top_n)
            .instrument(tracing::debug_span!("retrieval.rerank", pass = 1))
            .await?;

        let survivors = filter_by_relevance(reranked, first_threshold);
        tracing::debug!(
            threshold = first_threshold,
            count = survivors.len(),
            "First relevance filter"
        );
        if survivors.is_empty() {
            return Ok(Vec::new());
        }

        let expanded = self
            .expand_neighbors(&survivors)
            .instrument(tracing::debug_span!("retrieval.expand", count = survivors.len()))
            .await?;

        let top_n = expanded.len();
        let rescored = self
            .reranker
            .rerank(query, expanded, top_n)
            .instrument(tracing::debug_span!("retrieval.rerank", pass = 2))
            .await?;

        let relevant = filter_by_relevance(rescored, thresholds.retrieval_threshold);
        tracing::debug!(
            threshold = thresholds.retrieval_threshold,
            count = relevant.len(),
            mode = mode.as_str(),
            "Retrieval complete"
        );

        Ok(DocumentSet::merge([relevant]))
    }

    /// Add documents embedding-adjacent to `documents`.
    ///
    /// Each document's content is re-embedded and searched by vector; hits
    /// strictly closer than `distance_threshold` are merged with the inputs.
    /// A document found both as input and as neighbor is kept once, in its
    /// neighbor form. Output is ascending by id.
    pub async fn expand_neighbors(&self, documents: &[Document]) -> Result<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_many(&texts).await?;

        let k = self.config.neighbor_k;
        let lookups = vectors
            .iter()
            .map(|vector| self.index.similarity_search_by_vector(vector, k));
        let neighbor_lists = try_join_all(lookups).await?;

        let max_distance = self.config.thresholds.distance_threshold;
        let neighbors: Vec<Document> = neighbor_lists
            .into_iter()
            .flatten()
            .filter(|(_, distance)| *distance < max_distance)
            .map(|(doc, distance)| doc.with_distance(distance))
            .collect();

        tracing::debug!(
            inputs = documents.len(),
            neighbors = neighbors.len(),
            max_distance,
            "Neighbor expansion"
        );

        Ok(DocumentSet::merge([documents.to_vec(), neighbors]))
    }
}
