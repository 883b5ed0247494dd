//! Collaborator traits for the QA assistant
//!
//! Every external service sits behind one of these traits so backends can be
//! swapped by configuration and replaced with stubs in tests.
//!
//! # Trait Hierarchy
//!
//! ```text
//! Retrieval:
//!   - EmbeddingService: Text → vector
//!   - VectorIndex: Nearest-neighbor search and id lookup over document chunks
//!   - Reranker: Query-aware rescoring of a candidate list
//!
//! Language Models:
//!   - LanguageModel: Chat completion, blocking and streamed
//! ```

mod llm;
mod retrieval;

pub use llm::LanguageModel;
pub use retrieval::{EmbeddingService, Reranker, VectorIndex};
