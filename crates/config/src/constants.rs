//! Centralized default values
//!
//! Single source for endpoints and tuning defaults used by the config
//! sections and by component constructors that run without `Settings`.

/// Service endpoints
pub mod endpoints {
    /// Default Ollama endpoint (chat and embeddings)
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Default Qdrant endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6333";

    /// Default Cohere-compatible rerank endpoint
    pub const RERANK_DEFAULT: &str = "http://localhost:8081";
}

/// Model names
pub mod models {
    pub const CHAT_DEFAULT: &str = "llama3.1:8b";
    pub const EMBEDDING_DEFAULT: &str = "nomic-embed-text";
    pub const EMBEDDING_DIM: usize = 768;
    pub const RERANK_DEFAULT: &str = "rerank-multilingual-v3.0";
}

/// Timeouts
pub mod timeouts {
    /// LLM request timeout
    pub const LLM_REQUEST_MS: u64 = 60_000;

    /// Embedding / rerank request timeout
    pub const RETRIEVAL_REQUEST_MS: u64 = 15_000;

    /// End-to-end answer timeout for a single turn
    pub const ANSWER_SECS: u64 = 120;
}

/// Retrieval defaults
pub mod retrieval {
    /// Candidates fetched from the vector index
    pub const CANDIDATE_K: usize = 10;

    /// Documents kept by the first rerank pass
    pub const RERANK_TOP_N: usize = 6;

    /// Neighbors looked up per surviving document
    pub const NEIGHBOR_K: usize = 4;

    /// Titles looked up by the title index
    pub const TITLE_K: usize = 4;

    /// Minimum reranker score (strictly greater passes)
    pub const RETRIEVAL_THRESHOLD: f32 = 0.5;

    /// Maximum neighbor distance (strictly lower passes)
    pub const DISTANCE_THRESHOLD: f32 = 0.35;

    /// Relaxation factor for simplified-mode first filter
    pub const SIMPLIFIER: f32 = 0.8;

    /// Minimum term similarity for follow-up context
    pub const FOLLOWUP_THRESHOLD: f32 = 0.3;
}

/// Conversation history
pub mod history {
    /// Sliding window size in turns
    pub const MAX_TURNS: usize = 10;

    /// Turns passed to the query rewriter
    pub const REWRITE_TURNS: usize = 2;
}
