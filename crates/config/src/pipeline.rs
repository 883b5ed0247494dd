//! Language model, history and conversation pipeline configuration

use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, history, models, timeouts};
use crate::ConfigError;

/// Chat model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context window passed to Ollama as `num_ctx`
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    /// Maximum tokens to generate (`num_predict`)
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// How long Ollama keeps the model loaded between requests
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

fn default_llm_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_llm_model() -> String {
    models::CHAT_DEFAULT.to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_num_ctx() -> u32 {
    8192
}
fn default_num_predict() -> u32 {
    1024
}
fn default_llm_timeout_ms() -> u64 {
    timeouts::LLM_REQUEST_MS
}
fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_keep_alive() -> String {
    "5m".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            temperature: default_temperature(),
            num_ctx: default_num_ctx(),
            num_predict: default_num_predict(),
            timeout_ms: default_llm_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            keep_alive: default_keep_alive(),
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(
                "llm.temperature",
                format!("Must be between 0.0 and 2.0, got {}", self.temperature),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.model".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("llm.timeout_ms", "Must be positive"));
        }
        Ok(())
    }
}

/// Conversation history window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum stored turns; 0 keeps everything
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    history::MAX_TURNS
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

impl HistoryConfig {
    /// Window size, `None` when unbounded
    pub fn limit(&self) -> Option<usize> {
        (self.max_turns > 0).then_some(self.max_turns)
    }
}

/// Conversation pipeline behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rewrite the query and retry retrieval in simplified mode when the
    /// first turn finds nothing
    #[serde(default = "default_true")]
    pub second_chance: bool,

    /// Turns handed to the query rewriter
    #[serde(default = "default_rewrite_turns")]
    pub rewrite_turns: usize,

    /// End-to-end timeout for one answer
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_seconds: u64,

    /// Name the assistant answers to
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Subject area the assistant is restricted to
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Suggested questions shown by clients
    #[serde(default)]
    pub faq: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_rewrite_turns() -> usize {
    history::REWRITE_TURNS
}
fn default_answer_timeout() -> u64 {
    timeouts::ANSWER_SECS
}
fn default_assistant_name() -> String {
    "Turi".to_string()
}
fn default_domain() -> String {
    "Aeronautica Militare Italiana".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            second_chance: true,
            rewrite_turns: default_rewrite_turns(),
            answer_timeout_seconds: default_answer_timeout(),
            assistant_name: default_assistant_name(),
            domain: default_domain(),
            faq: Vec::new(),
        }
    }
}
