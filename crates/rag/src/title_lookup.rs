//! Title-then-content lookup
//!
//! A separate index holds one vector per document title, sharing ids with
//! the content index. Searching titles first and then fetching content by id
//! finds documents the user names directly ("il bando 2024").

use std::sync::Arc;

use qa_assistant_core::{Document, Result, VectorIndex};

use crate::document_set::DocumentSet;

pub struct TitleLookup {
    titles: Arc<dyn VectorIndex>,
    content: Arc<dyn VectorIndex>,
    title_k: usize,
}

impl TitleLookup {
    pub fn new(titles: Arc<dyn VectorIndex>, content: Arc<dyn VectorIndex>, title_k: usize) -> Self {
        Self {
            titles,
            content,
            title_k,
        }
    }

    /// Content documents whose titles best match `query`, in title rank order
    pub async fn lookup(&self, query: &str) -> Result<Vec<Document>> {
        let title_hits = self.titles.similarity_search(query, self.title_k).await?;
        if title_hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<u64> = title_hits.iter().map(|d| d.id).collect();
        let documents = self.content.get_by_ids(&ids).await?;
        tracing::debug!(
            query,
            titles = title_hits.len(),
            documents = documents.len(),
            "Title lookup"
        );

        Ok(DocumentSet::merge_in_insertion_order([documents]))
    }
}
