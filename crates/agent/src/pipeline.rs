//! Conversation pipeline
//!
//! One call to `answer` is one turn:
//!
//! 1. Route: an empty history goes straight to the first-turn branch
//!    (retrieve, optionally rewrite and retry, then document or
//!    conversational). Otherwise the classified intent picks the branch; a
//!    `document` intent gets the same rewrite and retry when it finds nothing.
//! 2. Generate with the chosen `BranchHandler`.
//! 3. Append the user turn and the answer, with its documents, to history.
//!
//! Retrieval failures degrade to the conversational branch and are reported
//! on the record. Generation failures and cancellation leave history as it was.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use qa_assistant_config::{PipelineConfig, RetrievalConfig};
use qa_assistant_core::{
    AnswerRecord, Document, Error, Intent, LanguageModel, Signature, Turn,
};
use qa_assistant_llm::Templates;
use qa_assistant_rag::{DocumentSet, RetrievalMode, Retriever};

use crate::branch::{
    BranchContext, BranchHandler, ConversationalBranch, DocumentBranch, FollowupBranch,
    SummaryBranch,
};
use crate::history::{ConversationHistory, HistorySnapshot};
use crate::intent::IntentClassifier;
use crate::rewriter::QueryRewriter;
use crate::AgentError;

/// Pipeline behavior knobs
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Rewrite and retry in simplified mode when document retrieval finds nothing
    pub second_chance: bool,
    /// Turns handed to the rewriter
    pub rewrite_turns: usize,
    /// Minimum TF-IDF similarity for a past answer's documents to count as follow-up context
    pub followup_threshold: f32,
    /// Default limit used by `answer_with_default_timeout`
    pub answer_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&PipelineConfig::default(), &RetrievalConfig::default())
    }
}

impl PipelineOptions {
    pub fn from_settings(pipeline: &PipelineConfig, retrieval: &RetrievalConfig) -> Self {
        Self {
            second_chance: pipeline.second_chance,
            rewrite_turns: pipeline.rewrite_turns,
            followup_threshold: retrieval.thresholds.followup_threshold,
            answer_timeout: Duration::from_secs(pipeline.answer_timeout_seconds),
        }
    }
}

/// Branch decision plus the documents it will be grounded on
#[derive(Debug)]
struct Route {
    signature: Signature,
    intent: Option<Intent>,
    documents: Vec<Document>,
    rewritten_query: Option<String>,
    retrieval_error: Option<String>,
}

impl Route {
    fn new(signature: Signature, intent: Option<Intent>) -> Self {
        Self {
            signature,
            intent,
            documents: Vec::new(),
            rewritten_query: None,
            retrieval_error: None,
        }
    }

    /// `signature` when documents were found, conversational otherwise
    fn grounded(signature: Signature, intent: Option<Intent>, documents: Vec<Document>) -> Self {
        if documents.is_empty() {
            return Self::new(Signature::Conversational, intent);
        }
        Self {
            documents,
            ..Self::new(signature, intent)
        }
    }

    fn degraded(intent: Option<Intent>, error: Error) -> Self {
        tracing::warn!(error = %error, "Retrieval unavailable, answering conversationally");
        Self {
            retrieval_error: Some(error.to_string()),
            ..Self::new(Signature::Conversational, intent)
        }
    }
}

pub struct ConversationPipeline {
    retriever: Arc<Retriever>,
    history: Arc<ConversationHistory>,
    classifier: IntentClassifier,
    rewriter: QueryRewriter,
    conversational: ConversationalBranch,
    document: DocumentBranch,
    followup: FollowupBranch,
    summary: SummaryBranch,
    options: PipelineOptions,
}

impl ConversationPipeline {
    pub fn new(
        retriever: Arc<Retriever>,
        llm: Arc<dyn LanguageModel>,
        templates: Arc<Templates>,
        history: Arc<ConversationHistory>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            retriever,
            history,
            classifier: IntentClassifier::new(llm.clone(), templates.clone()),
            rewriter: QueryRewriter::new(llm.clone(), templates.clone()),
            conversational: ConversationalBranch::new(llm.clone(), templates.clone()),
            document: DocumentBranch::new(llm.clone(), templates.clone()),
            followup: FollowupBranch::new(llm.clone(), templates.clone()),
            summary: SummaryBranch::new(llm, templates),
            options,
        }
    }

    pub fn history(&self) -> &Arc<ConversationHistory> {
        &self.history
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn handler(&self, signature: Signature) -> &dyn BranchHandler {
        match signature {
            Signature::Conversational => &self.conversational,
            Signature::Document => &self.document,
            Signature::Followup => &self.followup,
            Signature::Summary => &self.summary,
        }
    }

    /// Answer `query` and record the exchange
    pub async fn answer(&self, query: &str) -> Result<AnswerRecord, AgentError> {
        let started = Instant::now();
        let snapshot = self.history.snapshot();
        let route = self
            .route(query, &snapshot)
            .instrument(tracing::info_span!("pipeline.route", turns = snapshot.turns().len()))
            .await;

        let handler = self.handler(route.signature);
        let ctx = BranchContext {
            query,
            history: snapshot.turns(),
            documents: &route.documents,
        };
        let text = handler
            .answer(&ctx)
            .instrument(tracing::info_span!("pipeline.generate", signature = route.signature.as_str()))
            .await?;

        Ok(self.commit(query, text, route, started))
    }

    /// Like `answer`, forwarding each generated fragment to `tokens`.
    ///
    /// A closed receiver or a stream error before completion records nothing.
    pub async fn answer_stream(
        &self,
        query: &str,
        tokens: mpsc::Sender<String>,
    ) -> Result<AnswerRecord, AgentError> {
        let started = Instant::now();
        let snapshot = self.history.snapshot();
        let route = self
            .route(query, &snapshot)
            .instrument(tracing::info_span!("pipeline.route", turns = snapshot.turns().len()))
            .await;

        let handler = self.handler(route.signature);
        let ctx = BranchContext {
            query,
            history: snapshot.turns(),
            documents: &route.documents,
        };
        let request = handler.prompt(&ctx).with_streaming(true);

        let span = tracing::info_span!("pipeline.stream", signature = route.signature.as_str());
        let text = async {
            let mut stream = handler.model().generate_stream(request);
            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if !chunk.delta.is_empty() {
                    text.push_str(&chunk.delta);
                    if tokens.send(chunk.delta).await.is_err() {
                        tracing::debug!("Token receiver dropped, abandoning answer");
                        return Err(AgentError::Cancelled);
                    }
                }
                if chunk.is_final {
                    break;
                }
            }
            Ok::<_, AgentError>(text)
        }
        .instrument(span)
        .await?;

        Ok(self.commit(query, text.trim().to_string(), route, started))
    }

    /// `answer` bounded by `limit`; on expiry nothing is recorded
    pub async fn answer_with_timeout(
        &self,
        query: &str,
        limit: Duration,
    ) -> Result<AnswerRecord, AgentError> {
        match tokio::time::timeout(limit, self.answer(query)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(query, timeout_ms = limit.as_millis() as u64, "Answer timed out");
                Err(AgentError::Cancelled)
            }
        }
    }

    /// `answer_with_timeout` using the configured limit
    pub async fn answer_with_default_timeout(&self, query: &str) -> Result<AnswerRecord, AgentError> {
        self.answer_with_timeout(query, self.options.answer_timeout).await
    }

    async fn route(&self, query: &str, snapshot: &HistorySnapshot) -> Route {
        if snapshot.is_empty() {
            return self.first_turn(query, snapshot).await;
        }

        let intent = self.classifier.classify(query).await;
        match intent {
            Intent::Summary => Route::new(Signature::Summary, Some(intent)),
            Intent::Conversational => Route::new(Signature::Conversational, Some(intent)),
            Intent::Document => {
                self.retrieve_with_second_chance(query, snapshot, Some(intent))
                    .await
            }
            Intent::Followup => match self.followup_documents(query, snapshot).await {
                Ok(documents) => Route::grounded(Signature::Followup, Some(intent), documents),
                Err(e) => Route::degraded(Some(intent), e),
            },
        }
    }

    /// No history: retrieve, optionally rewrite and retry, never classify
    async fn first_turn(&self, query: &str, snapshot: &HistorySnapshot) -> Route {
        self.retrieve_with_second_chance(query, snapshot, None).await
    }

    /// Standard retrieval; when it finds nothing, rewrite the query over the
    /// recent turns and retry once in simplified mode
    async fn retrieve_with_second_chance(
        &self,
        query: &str,
        snapshot: &HistorySnapshot,
        intent: Option<Intent>,
    ) -> Route {
        let documents = match self.retriever.retrieve(query, RetrievalMode::Standard).await {
            Ok(documents) => documents,
            Err(e) => return Route::degraded(intent, e),
        };
        if !documents.is_empty() || !self.options.second_chance {
            return Route::grounded(Signature::Document, intent, documents);
        }

        let recent = snapshot.last_turns(self.options.rewrite_turns);
        let rewritten = match self.rewriter.rewrite(query, recent).await {
            Ok(rewritten) => rewritten,
            Err(e) => {
                tracing::warn!(error = %e, "Query rewrite failed, retrying with the original query");
                query.to_string()
            }
        };

        let mut route = match self
            .retriever
            .retrieve(&rewritten, RetrievalMode::Simplified)
            .await
        {
            Ok(documents) => Route::grounded(Signature::Document, intent, documents),
            Err(e) => Route::degraded(intent, e),
        };
        route.rewritten_query = Some(rewritten);
        route
    }

    /// Related past documents plus fresh retrieval, then neighbor expansion
    async fn followup_documents(
        &self,
        query: &str,
        snapshot: &HistorySnapshot,
    ) -> qa_assistant_core::Result<Vec<Document>> {
        let related = match snapshot
            .clone()
            .with_pending(Turn::user(query))
            .followup_context(self.options.followup_threshold)
        {
            Ok(documents) => documents,
            Err(e) => {
                tracing::warn!(error = %e, "Follow-up context unavailable, continuing without it");
                Vec::new()
            }
        };

        let retrieved = self.retriever.retrieve(query, RetrievalMode::Standard).await?;
        let union = DocumentSet::merge([related, retrieved]);
        self.retriever.expand_neighbors(&union).await
    }

    fn commit(&self, query: &str, answer: String, route: Route, started: Instant) -> AnswerRecord {
        self.history.record_exchange(
            Turn::user(query),
            Turn::assistant(answer.clone(), route.documents.clone()),
        );

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            signature = route.signature.as_str(),
            intent = route.intent.map(|i| i.as_str()),
            documents = route.documents.len(),
            degraded = route.retrieval_error.is_some(),
            elapsed_ms,
            "Answer ready"
        );

        AnswerRecord::new(answer, route.documents, route.signature)
            .with_intent(route.intent)
            .with_rewritten_query(route.rewritten_query)
            .with_retrieval_error(route.retrieval_error)
            .with_elapsed_ms(elapsed_ms)
    }
}
