//! Intent labels and answer branch signatures

use serde::{Deserialize, Serialize};

/// Closed label set produced by the intent classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Summarize the conversation so far
    Summary,
    /// Question about something discussed earlier
    Followup,
    /// New question needing corpus retrieval
    Document,
    /// Chit-chat, no retrieval
    Conversational,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Summary => "summary",
            Intent::Followup => "followup",
            Intent::Document => "document",
            Intent::Conversational => "conversational",
        }
    }

    /// Parse a classifier label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "summary" => Some(Intent::Summary),
            "followup" | "follow-up" | "follow_up" => Some(Intent::Followup),
            "document" => Some(Intent::Document),
            "conversational" => Some(Intent::Conversational),
            _ => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Name of the branch that produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signature {
    Conversational,
    Document,
    Followup,
    Summary,
}

impl Signature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signature::Conversational => "conversational",
            Signature::Document => "document",
            Signature::Followup => "followup",
            Signature::Summary => "summary",
        }
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
