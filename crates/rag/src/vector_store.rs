//! Vector index backed by Qdrant
//!
//! Points carry the passage in a `text` payload field and use numeric ids,
//! which become `Document::id`. Qdrant reports similarity scores; they are
//! converted to distances so lower always means closer.

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, Distance, GetPointsBuilder, PointId,
        SearchPointsBuilder, Value,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;

use qa_assistant_config::{VectorDistanceKind, VectorStoreConfig as VectorStoreSettings};
use qa_assistant_core::{Document, EmbeddingService, Result, VectorIndex};

use crate::RagError;

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Distance metric the collection was built with
    pub distance: VectorDistance,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl VectorStoreConfig {
    /// Content collection from settings
    pub fn content(settings: &VectorStoreSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            collection: settings.collection.clone(),
            distance: settings.distance.into(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Title collection from settings, if one is configured
    pub fn titles(settings: &VectorStoreSettings) -> Option<Self> {
        settings.title_collection.as_ref().map(|collection| Self {
            collection: collection.clone(),
            ..Self::content(settings)
        })
    }
}

/// Distance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDistance {
    Cosine,
    Euclidean,
    DotProduct,
}

impl VectorDistance {
    /// Convert a Qdrant score into a distance (lower is closer)
    pub fn score_to_distance(&self, score: f32) -> f32 {
        match self {
            VectorDistance::Cosine => 1.0 - score,
            VectorDistance::Euclidean => score,
            VectorDistance::DotProduct => -score,
        }
    }
}

impl From<VectorDistance> for Distance {
    fn from(d: VectorDistance) -> Self {
        match d {
            VectorDistance::Cosine => Distance::Cosine,
            VectorDistance::Euclidean => Distance::Euclid,
            VectorDistance::DotProduct => Distance::Dot,
        }
    }
}

impl From<VectorDistanceKind> for VectorDistance {
    fn from(kind: VectorDistanceKind) -> Self {
        match kind {
            VectorDistanceKind::Cosine => VectorDistance::Cosine,
            VectorDistanceKind::Euclidean => VectorDistance::Euclidean,
        }
    }
}

/// Qdrant collection as a [`VectorIndex`]
pub struct QdrantIndex {
    client: Qdrant,
    config: VectorStoreConfig,
    embedder: Arc<dyn EmbeddingService>,
}

impl QdrantIndex {
    /// Connect to Qdrant. Text queries are embedded with `embedder`.
    pub fn new(
        config: VectorStoreConfig,
        embedder: Arc<dyn EmbeddingService>,
    ) -> std::result::Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            embedder,
        })
    }

    /// Whether the collection exists; used by readiness checks
    pub async fn health_check(&self) -> std::result::Result<bool, RagError> {
        self.client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> std::result::Result<Vec<(Document, f32)>, RagError> {
        let builder = SearchPointsBuilder::new(&self.config.collection, vector.to_vec(), k as u64)
            .with_payload(true);

        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        let distance = self.config.distance;
        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                let doc = document_from_point(point.id, point.payload)?;
                Some((doc, distance.score_to_distance(point.score)))
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.search(&vector, k).await?;
        Ok(hits.into_iter().map(|(doc, _)| doc).collect())
    }

    async fn similarity_search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>> {
        Ok(self.search(vector, k).await?)
    }

    async fn get_by_ids(&self, ids: &[u64]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(*id)).collect();
        let response = self
            .client
            .get_points(GetPointsBuilder::new(&self.config.collection, point_ids).with_payload(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        let mut by_id: HashMap<u64, Document> = response
            .result
            .into_iter()
            .filter_map(|point| document_from_point(point.id, point.payload))
            .map(|doc| (doc.id, doc))
            .collect();

        // Qdrant does not guarantee response order
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn name(&self) -> &str {
        &self.config.collection
    }
}

fn document_from_point(id: Option<PointId>, payload: HashMap<String, Value>) -> Option<Document> {
    let id = match id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Num(n)) => n,
        other => {
            tracing::warn!(id = ?other, "Skipping point without numeric id");
            return None;
        },
    };

    let mut doc = Document::new(id, String::new());
    for (key, value) in payload {
        let Some(kind) = value.kind else { continue };
        match (key.as_str(), kind) {
            ("text", Kind::StringValue(s)) => doc.content = s,
            ("title", Kind::StringValue(s)) => doc.title = Some(s),
            ("source", Kind::StringValue(s)) => doc.source = Some(s),
            ("type", Kind::StringValue(s)) => doc.doc_type = Some(s),
            (_, kind) => {
                if let Some(json) = kind_to_json(kind) {
                    doc.metadata.insert(key, json);
                }
            },
        }
    }
    Some(doc)
}

fn kind_to_json(kind: Kind) -> Option<serde_json::Value> {
    match kind {
        Kind::StringValue(s) => Some(serde_json::Value::String(s)),
        Kind::IntegerValue(i) => Some(serde_json::Value::from(i)),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(f).map(serde_json::Value::Number),
        Kind::BoolValue(b) => Some(serde_json::Value::Bool(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_value(s: &str) -> Value {
        Value {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    #[test]
    fn test_score_to_distance() {
        assert!((VectorDistance::Cosine.score_to_distance(0.9) - 0.1).abs() < 1e-6);
        assert_eq!(VectorDistance::Euclidean.score_to_distance(2.5), 2.5);
        assert_eq!(VectorDistance::DotProduct.score_to_distance(3.0), -3.0);
    }

    #[test]
    fn test_document_from_point() {
        let mut payload = HashMap::new();
        payload.insert("text".to_string(), string_value("Il bando di concorso"));
        payload.insert("title".to_string(), string_value("Bando"));
        payload.insert(
            "page".to_string(),
            Value {
                kind: Some(Kind::IntegerValue(3)),
            },
        );

        let doc = document_from_point(Some(PointId::from(42u64)), payload).unwrap();
        assert_eq!(doc.id, 42);
        assert_eq!(doc.content, "Il bando di concorso");
        assert_eq!(doc.title.as_deref(), Some("Bando"));
        assert_eq!(doc.metadata["page"], serde_json::json!(3));
    }

    #[test]
    fn test_uuid_points_are_skipped() {
        let id = PointId::from("5f1c6f5e-7c3b-4d8e-9a43-1f0b6f6f2c11".to_string());
        assert!(document_from_point(Some(id), HashMap::new()).is_none());
    }

    #[test]
    fn test_title_collection_inherits_endpoint() {
        let settings = VectorStoreSettings {
            title_collection: Some("titles".to_string()),
            ..Default::default()
        };
        let titles = VectorStoreConfig::titles(&settings).unwrap();
        assert_eq!(titles.collection, "titles");
        assert_eq!(titles.endpoint, settings.endpoint);
        assert!(VectorStoreConfig::titles(&VectorStoreSettings::default()).is_none());
    }
}
