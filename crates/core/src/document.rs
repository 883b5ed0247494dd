//! Retrievable document type

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A chunk of the corpus as returned by the vector index.
///
/// Documents are read-only once created. Scoring stages attach
/// `relevance_score` or `distance` through the `with_*` builders, which
/// consume the document and hand back the updated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier used for dedup, lookup and ordering
    pub id: u64,
    /// Passage text
    pub content: String,
    /// Score attached by the reranker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
    /// Distance attached by neighbor expansion (lower is closer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Any further payload fields
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            relevance_score: None,
            distance: None,
            title: None,
            source: None,
            doc_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_relevance_score(mut self, score: f32) -> Self {
        self.relevance_score = Some(score);
        self
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Compose a marker-delimited passage as stored in the content index.
    pub fn compose_content(title: &str, source: &str, body: &str) -> String {
        format!("\\TITLE: {}\\SOURCE: {}\\BODY: {}", title, source, body)
    }

    /// Body part of a marker-delimited passage, or the whole content when
    /// no `\BODY:` marker is present.
    pub fn body(&self) -> &str {
        match self.content.find("\\BODY:") {
            Some(pos) => self.content[pos + "\\BODY:".len()..].trim_start(),
            None => &self.content,
        }
    }

    /// Whether the reranker score is strictly above `threshold`.
    /// Unscored documents never pass.
    pub fn is_relevant(&self, threshold: f32) -> bool {
        self.relevance_score.map(|s| s > threshold).unwrap_or(false)
    }
}
