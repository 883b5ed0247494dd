//! Rerankers
//!
//! - [`HttpReranker`]: Cohere-compatible `/v1/rerank` API (Cohere, Jina, TEI, ...)
//! - [`LexicalReranker`]: keyword-overlap scorer for offline use

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

use qa_assistant_config::RerankerConfig;
use qa_assistant_core::{Document, Reranker, Result};

use crate::RagError;

/// HTTP reranker configuration
#[derive(Debug, Clone)]
pub struct HttpRerankerConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl From<&RerankerConfig> for HttpRerankerConfig {
    fn from(config: &RerankerConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Cross-encoder reranking over HTTP
pub struct HttpReranker {
    client: Client,
    config: HttpRerankerConfig,
}

impl HttpReranker {
    pub fn new(config: HttpRerankerConfig) -> std::result::Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn request(
        &self,
        query: &str,
        documents: &[Document],
        top_n: usize,
    ) -> std::result::Result<Vec<RerankResult>, RagError> {
        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents: documents.iter().map(|d| d.content.as_str()).collect(),
            top_n,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/rerank", self.config.endpoint))
            .json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagError::Reranker(format!("Rerank request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Reranker(format!("HTTP {}: {}", status, text)));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagError::Reranker(format!("Failed to parse rerank response: {}", e)))?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        top_n: usize,
    ) -> Result<Vec<Document>> {
        if documents.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let results = self.request(query, &documents, top_n).await?;
        Ok(apply_scores(documents, results, top_n)?)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Attach scores by input index, highest first, at most `top_n`
fn apply_scores(
    documents: Vec<Document>,
    mut results: Vec<RerankResult>,
    top_n: usize,
) -> std::result::Result<Vec<Document>, RagError> {
    let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut reranked = Vec::with_capacity(top_n.min(results.len()));
    for result in results.into_iter().take(top_n) {
        let doc = slots
            .get_mut(result.index)
            .and_then(Option::take)
            .ok_or_else(|| {
                RagError::Reranker(format!("Result index {} out of range", result.index))
            })?;
        reranked.push(doc.with_relevance_score(result.relevance_score));
    }
    Ok(reranked)
}

/// Keyword-overlap scorer with TF-IDF-like weighting
///
/// Scores fall in [0, 1). Used when no rerank service is available.
pub struct LexicalScorer;

impl LexicalScorer {
    /// Common stopwords for Italian and English
    const STOPWORDS: &'static [&'static str] = &[
        // Italian
        "il", "lo", "la", "i", "gli", "le", "un", "uno", "una", "di", "del", "della", "dei",
        "delle", "da", "dal", "dalla", "in", "nel", "nella", "con", "su", "per", "tra", "fra",
        "e", "ed", "o", "ma", "che", "chi", "come", "cosa", "si", "non", "è", "sono", "al",
        "alla", "ai", "alle", "mi", "ti", "ci", "vi", "ne", "quale", "quali", "quando", "dove",
        // English
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "to", "of", "for", "on",
        "with", "at", "by", "from", "as", "and", "or", "but", "if", "how", "what", "which",
        "who", "when", "where", "why", "do", "does", "can", "i", "you", "it", "this", "that",
    ];

    /// Score `document` against `query`
    ///
    /// - Term frequency: sqrt(count in doc) for diminishing returns
    /// - IDF approximation: ln(1 + word length) favors specific terms
    /// - Position boost: earlier query terms weigh slightly more
    /// - Coverage bonus for matching more of the query
    pub fn score(query: &str, document: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let doc_lower = document.to_lowercase();

        let stopwords: HashSet<&str> = Self::STOPWORDS.iter().copied().collect();

        let query_terms: Vec<&str> = query_lower
            .unicode_words()
            .filter(|w| w.chars().count() > 1 && !stopwords.contains(*w))
            .collect();

        if query_terms.is_empty() {
            return 0.0;
        }

        let doc_words: Vec<&str> = doc_lower.unicode_words().collect();
        let doc_len = doc_words.len().max(1) as f32;
        let length_norm = 1.0 / (1.0 + (doc_len / 50.0).sqrt());

        let mut total_score = 0.0f32;
        let mut matched_terms = 0usize;

        for (pos, term) in query_terms.iter().enumerate() {
            let tf = doc_words.iter().filter(|w| **w == *term).count() as f32;
            if tf > 0.0 {
                matched_terms += 1;
                let idf_approx = (1.0 + term.chars().count() as f32).ln();
                let position_weight = 1.0 / (1.0 + pos as f32 * 0.1);
                total_score += tf.sqrt() * idf_approx * position_weight * length_norm;
            }
        }

        let coverage = matched_terms as f32 / query_terms.len() as f32;
        let raw_score = total_score + coverage * 0.3;
        (raw_score / (raw_score + 1.0)).min(1.0)
    }
}

/// [`Reranker`] over [`LexicalScorer`]
#[derive(Debug, Default, Clone)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        top_n: usize,
    ) -> Result<Vec<Document>> {
        let mut scored: Vec<Document> = documents
            .into_iter()
            .map(|doc| {
                let score = LexicalScorer::score(query, &doc.content);
                doc.with_relevance_score(score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_n);
        Ok(scored)
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_scorer_matches() {
        let score = LexicalScorer::score(
            "requisiti concorso accademia",
            "I requisiti per il concorso in Accademia Aeronautica",
        );
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_lexical_scorer_specific_beats_generic() {
        let specific = LexicalScorer::score(
            "requisiti concorso piloti",
            "Requisiti del concorso per piloti dell'Accademia",
        );
        let generic = LexicalScorer::score(
            "requisiti concorso piloti",
            "La mensa apre alle dodici",
        );
        assert!(specific > generic, "{} should beat {}", specific, generic);
    }

    #[test]
    fn test_lexical_scorer_only_stopwords() {
        assert_eq!(LexicalScorer::score("il la di", "il la di"), 0.0);
    }

    #[tokio::test]
    async fn test_lexical_reranker_truncates_and_sorts() {
        let docs = vec![
            Document::new(1, "orari mensa"),
            Document::new(2, "concorso piloti accademia"),
            Document::new(3, "concorso"),
        ];
        let reranked = LexicalReranker::new()
            .rerank("concorso piloti", docs, 2)
            .await
            .unwrap();

        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].id, 2);
        assert!(reranked.iter().all(|d| d.relevance_score.is_some()));
    }

    #[test]
    fn test_apply_scores_orders_by_score() {
        let docs = vec![Document::new(10, "a"), Document::new(20, "b"), Document::new(30, "c")];
        let results = vec![
            RerankResult { index: 0, relevance_score: 0.2 },
            RerankResult { index: 2, relevance_score: 0.9 },
        ];
        let reranked = apply_scores(docs, results, 6).unwrap();
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].id, 30);
        assert_eq!(reranked[0].relevance_score, Some(0.9));
        assert_eq!(reranked[1].id, 10);
    }

    #[test]
    fn test_apply_scores_rejects_bad_index() {
        let docs = vec![Document::new(1, "a")];
        let results = vec![RerankResult { index: 4, relevance_score: 0.5 }];
        assert!(apply_scores(docs, results, 1).is_err());
    }

    #[tokio::test]
    async fn test_http_reranker_skips_empty_input() {
        let reranker = HttpReranker::new(HttpRerankerConfig::from(&RerankerConfig::default())).unwrap();
        let out = reranker.rerank("q", Vec::new(), 6).await.unwrap();
        assert!(out.is_empty());
    }
}
