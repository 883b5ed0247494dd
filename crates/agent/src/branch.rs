//! Answer branches
//!
//! Each branch turns a `BranchContext` into a chat request. The pipeline
//! picks the branch; the branch only owns prompt selection and generation.

use std::sync::Arc;

use async_trait::async_trait;

use qa_assistant_core::{Document, GenerateRequest, LanguageModel, Signature, Turn};
use qa_assistant_llm::Templates;

use crate::AgentError;

/// Everything a branch may use to answer
#[derive(Debug, Clone, Copy)]
pub struct BranchContext<'a> {
    pub query: &'a str,
    /// Stored turns, not including the current query
    pub history: &'a [Turn],
    /// Documents the answer is grounded on
    pub documents: &'a [Document],
}

#[async_trait]
pub trait BranchHandler: Send + Sync {
    fn signature(&self) -> Signature;

    /// Chat request for this branch
    fn prompt(&self, ctx: &BranchContext<'_>) -> GenerateRequest;

    fn model(&self) -> &dyn LanguageModel;

    async fn answer(&self, ctx: &BranchContext<'_>) -> Result<String, AgentError> {
        let response = self.model().generate(self.prompt(ctx)).await?;
        Ok(response.text.trim().to_string())
    }
}

macro_rules! branch {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name {
            llm: Arc<dyn LanguageModel>,
            templates: Arc<Templates>,
        }

        impl $name {
            pub fn new(llm: Arc<dyn LanguageModel>, templates: Arc<Templates>) -> Self {
                Self { llm, templates }
            }
        }
    };
}

branch!(
    /// Small talk and fallback when nothing relevant was retrieved
    ConversationalBranch
);
branch!(
    /// Answer grounded on freshly retrieved documents
    DocumentBranch
);
branch!(
    /// Answer deepening an earlier topic
    FollowupBranch
);
branch!(
    /// Summary of the whole conversation
    SummaryBranch
);

#[async_trait]
impl BranchHandler for ConversationalBranch {
    fn signature(&self) -> Signature {
        Signature::Conversational
    }

    fn prompt(&self, ctx: &BranchContext<'_>) -> GenerateRequest {
        self.templates.conversational(ctx.history, ctx.query)
    }

    fn model(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }
}

#[async_trait]
impl BranchHandler for DocumentBranch {
    fn signature(&self) -> Signature {
        Signature::Document
    }

    fn prompt(&self, ctx: &BranchContext<'_>) -> GenerateRequest {
        self.templates.document(ctx.query, ctx.documents)
    }

    fn model(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }
}

#[async_trait]
impl BranchHandler for FollowupBranch {
    fn signature(&self) -> Signature {
        Signature::Followup
    }

    fn prompt(&self, ctx: &BranchContext<'_>) -> GenerateRequest {
        self.templates.followup(ctx.query, ctx.documents)
    }

    fn model(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }
}

#[async_trait]
impl BranchHandler for SummaryBranch {
    fn signature(&self) -> Signature {
        Signature::Summary
    }

    fn prompt(&self, ctx: &BranchContext<'_>) -> GenerateRequest {
        self.templates.summary(ctx.history, ctx.query)
    }

    fn model(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }
}
