//! In-memory vector index using brute-force L2 distance.
//!
//! Suitable for development, tests, and small corpora. Entries are kept in a
//! `BTreeMap` keyed by document id behind a `tokio::sync::RwLock`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use qa_assistant_core::{Document, EmbeddingService, Result, VectorIndex};

use crate::RagError;

struct Entry {
    document: Document,
    embedding: Vec<f32>,
}

/// Brute-force nearest-neighbor index
pub struct InMemoryIndex {
    name: String,
    entries: RwLock<BTreeMap<u64, Entry>>,
    embedder: Arc<dyn EmbeddingService>,
}

/// One line of a JSONL seed file
#[derive(Debug, Deserialize)]
struct SeedRecord {
    id: u64,
    text: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default, rename = "type")]
    doc_type: Option<String>,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>, embedder: Arc<dyn EmbeddingService>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            embedder,
        }
    }

    /// Embed and store documents, replacing any with the same id
    pub async fn insert_documents(&self, documents: Vec<Document>) -> Result<()> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_many(&texts).await?;

        let mut entries = self.entries.write().await;
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            entries.insert(document.id, Entry { document, embedding });
        }
        Ok(())
    }

    /// Store a document with a precomputed embedding
    pub async fn insert_with_embedding(&self, document: Document, embedding: Vec<f32>) {
        let mut entries = self.entries.write().await;
        entries.insert(document.id, Entry { document, embedding });
    }

    /// Load documents from a JSONL file of `{id, text, title?, source?, type?}` records
    pub async fn load_jsonl(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagError::VectorStore(format!("{}: {}", path.display(), e)))?;

        let mut documents = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: SeedRecord = serde_json::from_str(line).map_err(|e| {
                RagError::VectorStore(format!("{}:{}: {}", path.display(), line_no + 1, e))
            })?;
            let mut doc = Document::new(record.id, record.text);
            doc.title = record.title;
            doc.source = record.source;
            doc.doc_type = record.doc_type;
            documents.push(doc);
        }

        let count = documents.len();
        self.insert_documents(documents).await?;
        tracing::info!(index = %self.name, count, "Loaded seed documents");
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn nearest(&self, vector: &[f32], k: usize) -> Vec<(Document, f32)> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(Document, f32)> = entries
            .values()
            .map(|entry| (entry.document.clone(), l2_distance(&entry.embedding, vector)))
            .collect();

        // stable sort keeps id order among equal distances
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let vector = self.embedder.embed(query).await?;
        Ok(self
            .nearest(&vector, k)
            .await
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    async fn similarity_search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>> {
        Ok(self.nearest(vector, k).await)
    }

    async fn get_by_ids(&self, ids: &[u64]) -> Result<Vec<Document>> {
        let entries = self.entries.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id).map(|e| e.document.clone()))
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
