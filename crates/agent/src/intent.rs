//! LLM intent classification
//!
//! The model is asked for `{"type": "<label>"}`. Anything that does not
//! parse to a known label falls back to `Intent::Conversational`.

use std::sync::Arc;

use qa_assistant_core::{Error, Intent, LanguageModel, Result};
use qa_assistant_llm::Templates;

pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
    templates: Arc<Templates>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, templates: Arc<Templates>) -> Self {
        Self { llm, templates }
    }

    /// Classify `query`, never failing
    pub async fn classify(&self, query: &str) -> Intent {
        match self.try_classify(query).await {
            Ok(intent) => {
                tracing::debug!(query, intent = intent.as_str(), "Intent classified");
                intent
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "Intent classification failed, assuming conversational");
                Intent::Conversational
            }
        }
    }

    /// Classify `query`, surfacing generation errors and ambiguous labels
    pub async fn try_classify(&self, query: &str) -> Result<Intent> {
        let response = self.llm.generate(self.templates.classification(query)).await?;
        parse_label(&response.text)
    }
}

#[derive(serde::Deserialize)]
struct Classification {
    #[serde(rename = "type")]
    label: Option<String>,
}

/// Map a classifier completion to an intent
pub fn parse_label(text: &str) -> Result<Intent> {
    let object = extract_json_object(text)
        .ok_or_else(|| Error::ClassificationAmbiguous(format!("no JSON object in {:?}", text)))?;
    let parsed: Classification = serde_json::from_str(object)
        .map_err(|e| Error::ClassificationAmbiguous(e.to_string()))?;
    let label = parsed
        .label
        .ok_or_else(|| Error::ClassificationAmbiguous("missing \"type\"".to_string()))?;
    Intent::from_label(&label)
        .ok_or_else(|| Error::ClassificationAmbiguous(format!("unknown label {:?}", label)))
}

/// First balanced `{...}` in `text`, skipping braces inside strings
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
