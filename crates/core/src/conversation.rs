//! Conversation turn types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Document;

/// Role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// User message
    User,
    /// Assistant answer
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in the conversation
///
/// Turns are never mutated after creation. Assistant turns carry the
/// documents the answer was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the speaker
    pub role: TurnRole,
    /// Text of the turn
    pub text: String,
    /// Source documents (always empty for user turns)
    #[serde(default)]
    pub documents: Vec<Document>,
    /// When the turn occurred
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            documents: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant turn with its source documents
    pub fn assistant(text: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            documents,
            timestamp: Utc::now(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == TurnRole::Assistant
    }

    /// Text the follow-up similarity model is fitted on: the turn text
    /// followed by the content of each source document.
    pub fn similarity_text(&self) -> String {
        let mut text = self.text.clone();
        for doc in &self.documents {
            text.push(' ');
            text.push_str(&doc.content);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_constructors() {
        let user = Turn::user("Come si diventa piloti?");
        assert_eq!(user.role, TurnRole::User);
        assert!(user.documents.is_empty());

        let assistant = Turn::assistant("Con il concorso", vec![Document::new(5, "bando")]);
        assert!(assistant.is_assistant());
        assert_eq!(assistant.documents.len(), 1);
    }

    #[test]
    fn test_similarity_text_concatenates_documents() {
        let turn = Turn::assistant(
            "answer",
            vec![Document::new(1, "first"), Document::new(2, "second")],
        );
        assert_eq!(turn.similarity_text(), "answer first second");
    }

    #[test]
    fn test_turn_role_display() {
        assert_eq!(TurnRole::User.to_string(), "user");
        assert_eq!(TurnRole::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_turn_roundtrips_through_json() {
        let turn = Turn::assistant("a", vec![Document::new(9, "doc").with_relevance_score(0.7)]);
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.documents[0].id, 9);
        assert_eq!(back.documents[0].relevance_score, Some(0.7));
    }
}
