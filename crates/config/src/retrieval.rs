//! Retrieval configuration: embeddings, vector store, reranker, thresholds

use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, models, retrieval, timeouts};
use crate::ConfigError;

/// Score and distance thresholds applied by the retriever and the
/// follow-up context lookup. Fixed for the lifetime of a component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalThresholds {
    /// Reranker score a document must strictly exceed
    #[serde(default = "default_retrieval_threshold")]
    pub retrieval_threshold: f32,

    /// Neighbor distance a document must stay strictly under
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,

    /// Multiplier on `retrieval_threshold` for the first filter in simplified mode
    #[serde(default = "default_simplifier")]
    pub simplifier: f32,

    /// Term similarity a past turn must strictly exceed to count as follow-up context
    #[serde(default = "default_followup_threshold")]
    pub followup_threshold: f32,
}

fn default_retrieval_threshold() -> f32 {
    retrieval::RETRIEVAL_THRESHOLD
}
fn default_distance_threshold() -> f32 {
    retrieval::DISTANCE_THRESHOLD
}
fn default_simplifier() -> f32 {
    retrieval::SIMPLIFIER
}
fn default_followup_threshold() -> f32 {
    retrieval::FOLLOWUP_THRESHOLD
}

impl Default for RetrievalThresholds {
    fn default() -> Self {
        Self {
            retrieval_threshold: default_retrieval_threshold(),
            distance_threshold: default_distance_threshold(),
            simplifier: default_simplifier(),
            followup_threshold: default_followup_threshold(),
        }
    }
}

impl RetrievalThresholds {
    /// Threshold for the first filter in simplified mode
    pub fn simplified_threshold(&self) -> f32 {
        self.retrieval_threshold * self.simplifier
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.retrieval_threshold) {
            return Err(ConfigError::invalid(
                "retrieval.thresholds.retrieval_threshold",
                format!("Must be between 0.0 and 1.0, got {}", self.retrieval_threshold),
            ));
        }
        if !(0.0..=1.0).contains(&self.followup_threshold) {
            return Err(ConfigError::invalid(
                "retrieval.thresholds.followup_threshold",
                format!("Must be between 0.0 and 1.0, got {}", self.followup_threshold),
            ));
        }
        if self.simplifier <= 0.0 || self.simplifier > 1.0 {
            return Err(ConfigError::invalid(
                "retrieval.thresholds.simplifier",
                format!("Must be in (0.0, 1.0], got {}", self.simplifier),
            ));
        }
        if self.distance_threshold <= 0.0 {
            return Err(ConfigError::invalid(
                "retrieval.thresholds.distance_threshold",
                format!("Must be positive, got {}", self.distance_threshold),
            ));
        }
        Ok(())
    }
}

/// Retriever sizing and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched by similarity search
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,

    /// Documents kept by the first rerank pass
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Neighbors looked up per surviving document
    #[serde(default = "default_neighbor_k")]
    pub neighbor_k: usize,

    /// Titles looked up by the title index
    #[serde(default = "default_title_k")]
    pub title_k: usize,

    #[serde(default)]
    pub thresholds: RetrievalThresholds,
}

fn default_candidate_k() -> usize {
    retrieval::CANDIDATE_K
}
fn default_rerank_top_n() -> usize {
    retrieval::RERANK_TOP_N
}
fn default_neighbor_k() -> usize {
    retrieval::NEIGHBOR_K
}
fn default_title_k() -> usize {
    retrieval::TITLE_K
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            rerank_top_n: default_rerank_top_n(),
            neighbor_k: default_neighbor_k(),
            title_k: default_title_k(),
            thresholds: RetrievalThresholds::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rerank_top_n == 0 {
            return Err(ConfigError::invalid(
                "retrieval.rerank_top_n",
                "Must be at least 1",
            ));
        }
        if self.candidate_k < self.rerank_top_n {
            return Err(ConfigError::invalid(
                "retrieval.candidate_k",
                format!(
                    "Must be >= rerank_top_n ({}), got {}",
                    self.rerank_top_n, self.candidate_k
                ),
            ));
        }
        if self.neighbor_k == 0 {
            return Err(ConfigError::invalid("retrieval.neighbor_k", "Must be at least 1"));
        }
        self.thresholds.validate()
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector dimension produced by the model
    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,

    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_ollama_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_embedding_model() -> String {
    models::EMBEDDING_DEFAULT.to_string()
}
fn default_embedding_dim() -> usize {
    models::EMBEDDING_DIM
}
fn default_retrieval_timeout_ms() -> u64 {
    timeouts::RETRIEVAL_REQUEST_MS
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
            timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

/// Which vector index implementation to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Qdrant,
    /// Brute-force in-process index, for development
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorDistanceKind {
    #[default]
    Cosine,
    Euclidean,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,

    /// Content collection
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Optional collection of document titles sharing ids with `collection`
    #[serde(default)]
    pub title_collection: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub distance: VectorDistanceKind,

    /// JSONL file of documents loaded into the memory backend at startup
    #[serde(default)]
    pub seed_path: Option<String>,
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_collection() -> String {
    "documents".to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            endpoint: default_qdrant_endpoint(),
            collection: default_collection(),
            title_collection: None,
            api_key: None,
            distance: VectorDistanceKind::default(),
            seed_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankerBackend {
    /// Cohere-compatible HTTP rerank API
    Http,
    /// Keyword-overlap scorer, no network
    #[default]
    Lexical,
}

/// Reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub backend: RerankerBackend,

    #[serde(default = "default_rerank_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_rerank_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rerank_endpoint() -> String {
    endpoints::RERANK_DEFAULT.to_string()
}
fn default_rerank_model() -> String {
    models::RERANK_DEFAULT.to_string()
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            backend: RerankerBackend::default(),
            endpoint: default_rerank_endpoint(),
            model: default_rerank_model(),
            api_key: None,
            timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplified_threshold() {
        let thresholds = RetrievalThresholds {
            retrieval_threshold: 0.5,
            simplifier: 0.8,
            ..Default::default()
        };
        assert!((thresholds.simplified_threshold() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_validation() {
        let mut thresholds = RetrievalThresholds::default();
        assert!(thresholds.validate().is_ok());

        thresholds.retrieval_threshold = 1.2;
        assert!(thresholds.validate().is_err());
        thresholds.retrieval_threshold = 0.5;

        thresholds.simplifier = 0.0;
        assert!(thresholds.validate().is_err());
        thresholds.simplifier = 1.0;
        assert!(thresholds.validate().is_ok());

        thresholds.distance_threshold = 0.0;
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_top_n_cannot_exceed_candidates() {
        let mut config = RetrievalConfig::default();
        config.candidate_k = 4;
        config.rerank_top_n = 6;
        assert!(config.validate().is_err());

        config.candidate_k = 10;
        assert!(config.validate().is_ok());

        config.rerank_top_n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_names() {
        let backend: VectorBackend = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(backend, VectorBackend::Memory);
        let reranker: RerankerBackend = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(reranker, RerankerBackend::Http);
    }
}
