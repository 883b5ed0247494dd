//! Second-chance query rewriting
//!
//! When document retrieval finds nothing, the query is rewritten
//! into a standalone question using the last turns and retried in
//! simplified mode.

use std::sync::Arc;

use qa_assistant_core::{LanguageModel, Result, Turn};
use qa_assistant_llm::Templates;

pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
    templates: Arc<Templates>,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>, templates: Arc<Templates>) -> Self {
        Self { llm, templates }
    }

    /// Rewrite `query` using `recent` turns; empty output keeps the original
    pub async fn rewrite(&self, query: &str, recent: &[Turn]) -> Result<String> {
        let response = self
            .llm
            .generate(self.templates.rewrite(recent, query))
            .await?;

        let rewritten = clean(&response.text);
        if rewritten.is_empty() {
            tracing::debug!(query, "Rewrite came back empty, keeping the original query");
            return Ok(query.to_string());
        }

        tracing::debug!(query, rewritten = %rewritten, "Query rewritten");
        Ok(rewritten)
    }
}

const QUOTES: &[char] = &['"', '\'', '«', '»', '“', '”'];

fn clean(text: &str) -> String {
    text.trim().trim_matches(QUOTES).trim().to_string()
}
