//! End-to-end pipeline scenarios with stub collaborators

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use qa_assistant_agent::{AgentError, ConversationHistory, ConversationPipeline, PipelineOptions};
use qa_assistant_core::{
    Document, EmbeddingService, Error, GenerateRequest, GenerateResponse, Intent, LanguageModel,
    Reranker, Result, Signature, StreamChunk, Turn, VectorIndex,
};
use qa_assistant_llm::Templates;
use qa_assistant_rag::{Retriever, RetrieverConfig};

#[derive(Default)]
struct StubIndex {
    candidates: Vec<Document>,
    fail: bool,
    searches: AtomicUsize,
}

#[async_trait]
impl VectorIndex for StubIndex {
    async fn similarity_search(&self, _query: &str, k: usize) -> Result<Vec<Document>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::RetrievalUnavailable("index offline".to_string()));
        }
        Ok(self.candidates.iter().take(k).cloned().collect())
    }

    async fn similarity_search_by_vector(
        &self,
        _vector: &[f32],
        _k: usize,
    ) -> Result<Vec<(Document, f32)>> {
        Ok(Vec::new())
    }

    async fn get_by_ids(&self, _ids: &[u64]) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

struct ZeroEmbedder;

#[async_trait]
impl EmbeddingService for ZeroEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; 4])
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
    }

    fn dimension(&self) -> usize {
        4
    }
}

/// Scores every document with the score registered for the query text
#[derive(Default)]
struct QueryReranker {
    scores: HashMap<String, f32>,
}

impl QueryReranker {
    fn with(mut self, query: &str, score: f32) -> Self {
        self.scores.insert(query.to_string(), score);
        self
    }
}

#[async_trait]
impl Reranker for QueryReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        top_n: usize,
    ) -> Result<Vec<Document>> {
        let score = self.scores.get(query).copied().unwrap_or(0.0);
        Ok(documents
            .into_iter()
            .take(top_n)
            .map(|d| d.with_relevance_score(score))
            .collect())
    }

    fn name(&self) -> &str {
        "query"
    }
}

/// Classifier requests are JSON mode, rewrite requests run at temperature 0,
/// everything else is an answer
struct ScriptedLlm {
    label: String,
    rewrite: String,
    answer: String,
    fail_answers: bool,
    delay: Duration,
    classify_calls: AtomicUsize,
    rewrite_calls: AtomicUsize,
    answer_calls: AtomicUsize,
    rewrite_prompts: parking_lot::Mutex<Vec<String>>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self {
            label: r#"{"type": "document"}"#.to_string(),
            rewrite: String::new(),
            answer: "Risposta di prova".to_string(),
            fail_answers: false,
            delay: Duration::ZERO,
            classify_calls: AtomicUsize::new(0),
            rewrite_calls: AtomicUsize::new(0),
            answer_calls: AtomicUsize::new(0),
            rewrite_prompts: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedLlm {
    fn labelled(label: &str) -> Self {
        Self {
            label: format!(r#"{{"type": "{}"}}"#, label),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        if request.json_mode {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(GenerateResponse::text(self.label.clone()));
        }
        if request.temperature == Some(0.0) {
            self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
            let prompt = request
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.rewrite_prompts.lock().push(prompt);
            return Ok(GenerateResponse::text(self.rewrite.clone()));
        }

        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_answers {
            return Err(Error::GenerationFailure("model crashed".to_string()));
        }
        Ok(GenerateResponse::text(self.answer.clone()))
    }

    fn generate_stream<'a>(
        &'a self,
        _request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send + 'a>> {
        if self.fail_answers {
            return Box::pin(futures::stream::iter(vec![
                Ok(StreamChunk::text("Risposta ")),
                Err(Error::GenerationFailure("stream broke".to_string())),
            ]));
        }
        let mut chunks: Vec<Result<StreamChunk>> = self
            .answer
            .split_inclusive(' ')
            .map(|w| Ok(StreamChunk::text(w)))
            .collect();
        chunks.push(Ok(StreamChunk::final_chunk(Default::default())));
        Box::pin(futures::stream::iter(chunks))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct Fixture {
    pipeline: ConversationPipeline,
    index: Arc<StubIndex>,
    llm: Arc<ScriptedLlm>,
}

fn fixture(index: StubIndex, reranker: QueryReranker, llm: ScriptedLlm) -> Fixture {
    fixture_with_history(index, reranker, llm, ConversationHistory::new(Some(10)))
}

fn fixture_with_history(
    index: StubIndex,
    reranker: QueryReranker,
    llm: ScriptedLlm,
    history: ConversationHistory,
) -> Fixture {
    let index = Arc::new(index);
    let llm = Arc::new(llm);
    let retriever = Arc::new(Retriever::new(
        index.clone(),
        Arc::new(ZeroEmbedder),
        Arc::new(reranker),
        RetrieverConfig::default(),
    ));
    let pipeline = ConversationPipeline::new(
        retriever,
        llm.clone(),
        Arc::new(Templates::default()),
        Arc::new(history),
        PipelineOptions::default(),
    );
    Fixture {
        pipeline,
        index,
        llm,
    }
}

fn corpus() -> Vec<Document> {
    vec![Document::new(5, "Per diventare piloti occorre superare il concorso per l'Accademia")]
}

fn seeded_history() -> ConversationHistory {
    let history = ConversationHistory::new(Some(10));
    history.record_exchange(
        Turn::user("Come si diventa piloti in Accademia?"),
        Turn::assistant(
            "Serve superare il concorso per l'Accademia",
            vec![Document::new(5, "concorso Accademia piloti")],
        ),
    );
    history
}

#[tokio::test]
async fn first_turn_grounded_answer() {
    let query = "Come si diventa piloti in Accademia?";
    let f = fixture(
        StubIndex {
            candidates: corpus(),
            ..Default::default()
        },
        QueryReranker::default().with(query, 0.81),
        ScriptedLlm::default(),
    );

    let record = f.pipeline.answer(query).await.unwrap();

    assert_eq!(record.signature, Signature::Document);
    assert_eq!(record.intent, None);
    assert_eq!(record.context.iter().map(|d| d.id).collect::<Vec<_>>(), vec![5]);
    assert!(record.retrieval_error.is_none());
    assert_eq!(f.llm.classify_calls.load(Ordering::SeqCst), 0);

    let turns = f.pipeline.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].text, query);
    assert_eq!(turns[1].documents.len(), 1);
}

#[tokio::test]
async fn first_turn_second_chance_uses_rewritten_query() {
    let f = fixture(
        StubIndex {
            candidates: corpus(),
            ..Default::default()
        },
        QueryReranker::default()
            .with("E questi?", 0.2)
            .with("Quali sono i concorsi per piloti?", 0.55),
        ScriptedLlm {
            rewrite: "\"Quali sono i concorsi per piloti?\"".to_string(),
            ..Default::default()
        },
    );

    let record = f.pipeline.answer("E questi?").await.unwrap();

    assert_eq!(record.signature, Signature::Document);
    assert_eq!(record.rewritten_query.as_deref(), Some("Quali sono i concorsi per piloti?"));
    assert_eq!(record.context.len(), 1);
    assert_eq!(f.llm.rewrite_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.index.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn first_turn_without_results_is_conversational() {
    let f = fixture(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm::default(),
    );

    let record = f.pipeline.answer("Ciao!").await.unwrap();

    assert_eq!(record.signature, Signature::Conversational);
    assert!(record.context.is_empty());
    assert!(record.retrieval_error.is_none());
    assert_eq!(f.pipeline.history().len(), 2);
}

#[tokio::test]
async fn failed_retrieval_degrades_to_conversational() {
    let f = fixture(
        StubIndex {
            fail: true,
            ..Default::default()
        },
        QueryReranker::default(),
        ScriptedLlm::default(),
    );

    let record = f.pipeline.answer("Quali sono i requisiti?").await.unwrap();

    assert_eq!(record.signature, Signature::Conversational);
    assert!(record.context.is_empty());
    assert!(record.retrieval_error.is_some());
    assert!(!record.is_grounded());

    let turns = f.pipeline.history().turns();
    assert_eq!(turns.len(), 2);
    assert!(turns[1].documents.is_empty());
}

#[tokio::test]
async fn generation_failure_leaves_history_unchanged() {
    let f = fixture_with_history(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm {
            label: r#"{"type": "conversational"}"#.to_string(),
            fail_answers: true,
            ..Default::default()
        },
        seeded_history(),
    );

    let result = f.pipeline.answer("Grazie!").await;

    assert!(matches!(result, Err(AgentError::GenerationFailure(_))));
    assert_eq!(f.pipeline.history().len(), 2);
}

#[tokio::test]
async fn timeout_cancels_without_recording() {
    let f = fixture(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm {
            delay: Duration::from_millis(500),
            ..Default::default()
        },
    );

    let result = f
        .pipeline
        .answer_with_timeout("Ciao", Duration::from_millis(20))
        .await;

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(f.pipeline.history().is_empty());
}

#[tokio::test]
async fn later_turns_are_classified() {
    let f = fixture_with_history(
        StubIndex {
            candidates: corpus(),
            ..Default::default()
        },
        QueryReranker::default(),
        ScriptedLlm::labelled("summary"),
        seeded_history(),
    );

    let record = f.pipeline.answer("Puoi fare un riassunto?").await.unwrap();

    assert_eq!(record.signature, Signature::Summary);
    assert_eq!(record.intent, Some(Intent::Summary));
    assert!(record.context.is_empty());
    assert_eq!(f.llm.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.index.searches.load(Ordering::SeqCst), 0);
    assert_eq!(f.pipeline.history().len(), 4);
}

#[tokio::test]
async fn garbage_classification_answers_conversationally() {
    let f = fixture_with_history(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm {
            label: "boh".to_string(),
            ..Default::default()
        },
        seeded_history(),
    );

    let record = f.pipeline.answer("Come ti chiami?").await.unwrap();

    assert_eq!(record.signature, Signature::Conversational);
    assert_eq!(record.intent, Some(Intent::Conversational));
    assert_eq!(f.index.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn document_intent_without_results_falls_back() {
    let f = fixture_with_history(
        StubIndex {
            candidates: corpus(),
            ..Default::default()
        },
        QueryReranker::default().with("Orari della mensa?", 0.1),
        ScriptedLlm::labelled("document"),
        seeded_history(),
    );

    let record = f.pipeline.answer("Orari della mensa?").await.unwrap();

    assert_eq!(record.signature, Signature::Conversational);
    assert_eq!(record.intent, Some(Intent::Document));
    assert!(record.context.is_empty());
    // Empty rewrite keeps the original query for the simplified retry
    assert_eq!(record.rewritten_query.as_deref(), Some("Orari della mensa?"));
    assert_eq!(f.llm.rewrite_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.index.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn document_intent_second_chance_uses_history() {
    let f = fixture_with_history(
        StubIndex {
            candidates: corpus(),
            ..Default::default()
        },
        QueryReranker::default()
            .with("E questi?", 0.2)
            .with("Quali sono i concorsi per piloti?", 0.55),
        ScriptedLlm {
            rewrite: "\"Quali sono i concorsi per piloti?\"".to_string(),
            ..ScriptedLlm::labelled("document")
        },
        seeded_history(),
    );

    let record = f.pipeline.answer("E questi?").await.unwrap();

    assert_eq!(record.signature, Signature::Document);
    assert_eq!(record.intent, Some(Intent::Document));
    assert_eq!(record.rewritten_query.as_deref(), Some("Quali sono i concorsi per piloti?"));
    assert_eq!(record.context.iter().map(|d| d.id).collect::<Vec<_>>(), vec![5]);
    assert_eq!(f.llm.rewrite_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.index.searches.load(Ordering::SeqCst), 2);

    let prompts = f.llm.rewrite_prompts.lock();
    assert!(prompts[0].contains("Come si diventa piloti in Accademia?"));
    assert!(prompts[0].contains("Serve superare il concorso per l'Accademia"));
}

#[tokio::test]
async fn followup_with_empty_vocabulary_history_still_retrieves() {
    let query = "Quando esce il bando?";
    let history = ConversationHistory::new(None);
    history.record_exchange(
        Turn::user("?"),
        Turn::assistant("!", vec![Document::new(7, "!")]),
    );
    let f = fixture_with_history(
        StubIndex {
            candidates: corpus(),
            ..Default::default()
        },
        QueryReranker::default().with(query, 0.9),
        ScriptedLlm::labelled("followup"),
        history,
    );

    let record = f.pipeline.answer(query).await.unwrap();

    assert_eq!(record.signature, Signature::Followup);
    assert_eq!(record.context.iter().map(|d| d.id).collect::<Vec<_>>(), vec![5]);
    assert!(record.retrieval_error.is_none());
    assert!(f.index.searches.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn followup_with_empty_vocabulary_history_and_no_results_is_conversational() {
    let history = ConversationHistory::new(None);
    history.record_exchange(
        Turn::user("?"),
        Turn::assistant("!", vec![Document::new(7, "!")]),
    );
    let f = fixture_with_history(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm::labelled("followup"),
        history,
    );

    let record = f.pipeline.answer("E allora?").await.unwrap();

    assert_eq!(record.signature, Signature::Conversational);
    assert_eq!(record.intent, Some(Intent::Followup));
    assert!(record.context.is_empty());
    assert_eq!(f.index.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn followup_recovers_documents_from_history() {
    let f = fixture_with_history(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm::labelled("followup"),
        seeded_history(),
    );

    let record = f.pipeline.answer("Dimmi di più").await.unwrap();

    assert_eq!(record.signature, Signature::Followup);
    assert_eq!(record.context.iter().map(|d| d.id).collect::<Vec<_>>(), vec![5]);

    let turns = f.pipeline.history().turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[3].documents.len(), 1);
}

#[tokio::test]
async fn followup_merges_history_and_retrieval() {
    let query = "Quanti posti ci sono al concorso?";
    let f = fixture_with_history(
        StubIndex {
            candidates: vec![Document::new(2, "Posti disponibili nel bando 2024")],
            ..Default::default()
        },
        QueryReranker::default().with(query, 0.9),
        ScriptedLlm::labelled("followup"),
        seeded_history(),
    );

    let record = f.pipeline.answer(query).await.unwrap();

    assert_eq!(record.signature, Signature::Followup);
    assert_eq!(record.context.iter().map(|d| d.id).collect::<Vec<_>>(), vec![2, 5]);
}

#[tokio::test]
async fn streaming_forwards_tokens_then_records() {
    let f = fixture(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm {
            answer: "Ciao, come posso aiutarti?".to_string(),
            ..Default::default()
        },
    );
    let (tx, mut rx) = mpsc::channel(32);

    let record = f.pipeline.answer_stream("Ciao", tx).await.unwrap();

    let mut streamed = String::new();
    while let Some(token) = rx.recv().await {
        streamed.push_str(&token);
    }
    assert_eq!(streamed, "Ciao, come posso aiutarti?");
    assert_eq!(record.answer, "Ciao, come posso aiutarti?");
    assert_eq!(f.pipeline.history().len(), 2);
}

#[tokio::test]
async fn streaming_with_dropped_receiver_records_nothing() {
    let f = fixture(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm::default(),
    );
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let result = f.pipeline.answer_stream("Ciao", tx).await;

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(f.pipeline.history().is_empty());
}

#[tokio::test]
async fn streaming_error_records_nothing() {
    let f = fixture(
        StubIndex::default(),
        QueryReranker::default(),
        ScriptedLlm {
            fail_answers: true,
            ..Default::default()
        },
    );
    let (tx, _rx) = mpsc::channel(32);

    let result = f.pipeline.answer_stream("Ciao", tx).await;

    assert!(matches!(result, Err(AgentError::GenerationFailure(_))));
    assert!(f.pipeline.history().is_empty());
}
