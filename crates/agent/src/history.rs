//! Conversation history
//!
//! Bounded FIFO of turns. Writers take the lock once per exchange so a
//! reader never sees a user turn without its answer; similarity work runs
//! on a cloned `HistorySnapshot` outside the lock.

use std::collections::VecDeque;

use parking_lot::RwLock;

use qa_assistant_config::HistoryConfig;
use qa_assistant_core::{Document, Turn};

use crate::tfidf::{cosine, TfIdf};
use crate::AgentError;

pub struct ConversationHistory {
    turns: RwLock<VecDeque<Turn>>,
    limit: Option<usize>,
}

impl ConversationHistory {
    /// `limit` caps stored turns; `None` keeps everything
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            turns: RwLock::new(VecDeque::new()),
            limit,
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.limit())
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn push(&self, turn: Turn) {
        let mut turns = self.turns.write();
        turns.push_back(turn);
        self.evict(&mut turns);
    }

    /// Append a user turn and its answer under one write lock
    pub fn record_exchange(&self, user: Turn, assistant: Turn) {
        let mut turns = self.turns.write();
        turns.push_back(user);
        turns.push_back(assistant);
        self.evict(&mut turns);
    }

    fn evict(&self, turns: &mut VecDeque<Turn>) {
        if let Some(limit) = self.limit {
            while turns.len() > limit {
                turns.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.turns.read().iter().cloned().collect()
    }

    /// Up to `n` most recent turns, oldest first
    pub fn last_turns(&self, n: usize) -> Vec<Turn> {
        let turns = self.turns.read();
        let skip = turns.len().saturating_sub(n);
        turns.iter().skip(skip).cloned().collect()
    }

    pub fn assistant_turn_count(&self) -> usize {
        self.turns.read().iter().filter(|t| t.is_assistant()).count()
    }

    pub fn clear(&self) {
        self.turns.write().clear();
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            turns: self.turns(),
        }
    }

    /// Follow-up context over the stored turns; the newest stored turn is the query
    pub fn get_followup_context(&self, threshold: f32) -> Result<Vec<Document>, AgentError> {
        self.snapshot().followup_context(threshold)
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::from_config(&HistoryConfig::default())
    }
}

/// Immutable copy of the history at one point in time
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    turns: Vec<Turn>,
}

impl HistorySnapshot {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent `n` turns, oldest first
    pub fn last_turns(&self, n: usize) -> &[Turn] {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.split_at(skip).1
    }

    /// Add a turn that has arrived but is not stored yet
    pub fn with_pending(mut self, turn: Turn) -> Self {
        self.turns.push(turn);
        self
    }

    /// Documents of earlier answers related to the most recent turn.
    ///
    /// Every assistant turn whose text and documents are TF-IDF similar to
    /// the most recent turn above `threshold` contributes its documents, in
    /// turn order. With no match the last assistant turn's documents are
    /// returned. No assistant turn at all yields an empty list.
    pub fn followup_context(&self, threshold: f32) -> Result<Vec<Document>, AgentError> {
        let assistant: Vec<&Turn> = self.turns.iter().filter(|t| t.is_assistant()).collect();
        let (Some(query), Some(last_answer)) = (self.turns.last(), assistant.last()) else {
            return Ok(Vec::new());
        };

        let corpus: Vec<String> = assistant.iter().map(|t| t.similarity_text()).collect();
        let model = TfIdf::fit(&corpus)?;
        let query_row = model.transform(&query.text);

        let mut documents = Vec::new();
        for (turn, text) in assistant.iter().zip(&corpus) {
            let similarity = cosine(&query_row, &model.transform(text));
            if similarity > threshold {
                documents.extend(turn.documents.iter().cloned());
            }
        }

        if documents.is_empty() {
            tracing::debug!(threshold, "No related answer, using the last one");
            return Ok(last_answer.documents.clone());
        }

        tracing::debug!(threshold, count = documents.len(), "Follow-up context");
        Ok(documents)
    }
}
