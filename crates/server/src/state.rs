//! Application State
//!
//! Shared state across all handlers: settings, sessions and the collaborators
//! every session's pipeline is built from.

use std::sync::Arc;
use std::time::Duration;

use qa_assistant_agent::{ConversationHistory, ConversationPipeline, PipelineOptions};
use qa_assistant_config::{HistoryConfig, RerankerBackend, Settings, VectorBackend};
use qa_assistant_core::{EmbeddingService, LanguageModel, Reranker, VectorIndex};
use qa_assistant_llm::{OllamaBackend, OllamaConfig, Templates};
use qa_assistant_rag::{
    HashingEmbedder, HttpReranker, HttpRerankerConfig, InMemoryIndex, LexicalReranker,
    OllamaEmbedder, OllamaEmbeddingConfig, QdrantIndex, Retriever, RetrieverConfig, TitleLookup,
    VectorStoreConfig,
};

use crate::session::SessionManager;
use crate::ServerError;

/// Collaborators shared by every session
pub struct Components {
    pub retriever: Arc<Retriever>,
    pub llm: Arc<dyn LanguageModel>,
    pub templates: Arc<Templates>,
    /// Present when a title collection is configured
    pub titles: Option<Arc<TitleLookup>>,
    pub options: PipelineOptions,
    pub history: HistoryConfig,
}

impl Components {
    /// Wire the configured backends
    pub async fn from_settings(settings: &Settings) -> Result<Self, ServerError> {
        let embedder: Arc<dyn EmbeddingService> = match settings.vector_store.backend {
            VectorBackend::Qdrant => Arc::new(
                OllamaEmbedder::new(OllamaEmbeddingConfig::from(&settings.embedding))
                    .map_err(|e| ServerError::Internal(e.to_string()))?,
            ),
            VectorBackend::Memory => Arc::new(HashingEmbedder::new(settings.embedding.dimension)),
        };

        let (index, title_index): (Arc<dyn VectorIndex>, Option<Arc<dyn VectorIndex>>) =
            match settings.vector_store.backend {
                VectorBackend::Qdrant => {
                    let content = QdrantIndex::new(
                        VectorStoreConfig::content(&settings.vector_store),
                        embedder.clone(),
                    )
                    .map_err(|e| ServerError::Internal(e.to_string()))?;
                    let titles = match VectorStoreConfig::titles(&settings.vector_store) {
                        Some(config) => Some(Arc::new(
                            QdrantIndex::new(config, embedder.clone())
                                .map_err(|e| ServerError::Internal(e.to_string()))?,
                        ) as Arc<dyn VectorIndex>),
                        None => None,
                    };
                    (Arc::new(content) as Arc<dyn VectorIndex>, titles)
                }
                VectorBackend::Memory => {
                    let index = InMemoryIndex::new(&settings.vector_store.collection, embedder.clone());
                    if let Some(path) = &settings.vector_store.seed_path {
                        let loaded = index.load_jsonl(path).await?;
                        tracing::info!(path = %path, documents = loaded, "Seeded in-memory index");
                    }
                    (Arc::new(index) as Arc<dyn VectorIndex>, None)
                }
            };

        let reranker: Arc<dyn Reranker> = match settings.reranker.backend {
            RerankerBackend::Http => Arc::new(
                HttpReranker::new(HttpRerankerConfig::from(&settings.reranker))
                    .map_err(|e| ServerError::Internal(e.to_string()))?,
            ),
            RerankerBackend::Lexical => Arc::new(LexicalReranker::new()),
        };

        let llm = OllamaBackend::new(OllamaConfig::from(&settings.llm))
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        let titles = title_index.map(|titles| {
            Arc::new(TitleLookup::new(
                titles,
                index.clone(),
                settings.retrieval.title_k,
            ))
        });

        tracing::info!(
            vector_backend = ?settings.vector_store.backend,
            reranker_backend = ?settings.reranker.backend,
            model = %settings.llm.model,
            title_lookup = titles.is_some(),
            "Components initialized"
        );

        Ok(Self {
            retriever: Arc::new(Retriever::new(
                index,
                embedder,
                reranker,
                RetrieverConfig::from(&settings.retrieval),
            )),
            llm: Arc::new(llm),
            templates: Arc::new(Templates::new(
                settings.pipeline.assistant_name.clone(),
                settings.pipeline.domain.clone(),
            )),
            titles,
            options: PipelineOptions::from_settings(&settings.pipeline, &settings.retrieval),
            history: settings.history.clone(),
        })
    }

    /// Fresh pipeline with an empty history
    pub fn new_pipeline(&self) -> ConversationPipeline {
        ConversationPipeline::new(
            self.retriever.clone(),
            self.llm.clone(),
            self.templates.clone(),
            Arc::new(ConversationHistory::from_config(&self.history)),
            self.options.clone(),
        )
    }
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub components: Arc<Components>,
}

impl AppState {
    pub fn new(config: Settings, components: Components) -> Self {
        let sessions = SessionManager::with_config(
            config.server.max_sessions,
            Duration::from_secs(config.server.session_timeout_seconds),
            Duration::from_secs(config.server.cleanup_interval_seconds),
        );
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            components: Arc::new(components),
        }
    }
}
