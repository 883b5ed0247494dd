//! Terminal output of a pipeline turn

use serde::{Deserialize, Serialize};

use crate::{Document, Intent, Signature};

/// Answer produced by one branch of the conversation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub answer: String,
    /// Documents the answer is grounded on, ascending by id
    #[serde(default)]
    pub context: Vec<Document>,
    pub signature: Signature,
    /// Classified intent; `None` on the first turn, which skips the classifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Query used for simplified retrieval after a rewrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
    /// Set when retrieval failed and the answer fell back to conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_error: Option<String>,
    /// Wall-clock time to produce the answer
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl AnswerRecord {
    pub fn new(answer: impl Into<String>, context: Vec<Document>, signature: Signature) -> Self {
        Self {
            answer: answer.into(),
            context,
            signature,
            intent: None,
            rewritten_query: None,
            retrieval_error: None,
            elapsed_ms: 0,
        }
    }

    pub fn with_intent(mut self, intent: Option<Intent>) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_rewritten_query(mut self, query: Option<String>) -> Self {
        self.rewritten_query = query;
        self
    }

    pub fn with_retrieval_error(mut self, error: Option<String>) -> Self {
        self.retrieval_error = error;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Whether the answer cites corpus documents
    pub fn is_grounded(&self) -> bool {
        !self.context.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_answer_is_not_grounded() {
        let record = AnswerRecord::new("Ciao!", Vec::new(), Signature::Conversational)
            .with_retrieval_error(Some("qdrant unreachable".into()));
        assert!(!record.is_grounded());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["signature"], "conversational");
        assert_eq!(json["retrieval_error"], "qdrant unreachable");
        assert!(json.get("intent").is_none());
    }
}
