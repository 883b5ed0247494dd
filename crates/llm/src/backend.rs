//! Ollama chat backend
//!
//! Non-streaming calls retry network errors and 5xx responses with
//! exponential backoff. Streaming calls read the NDJSON body chunk by chunk
//! and are not retried once bytes have been yielded.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use qa_assistant_config::LlmConfig;
use qa_assistant_core::{
    FinishReason, GenerateRequest, GenerateResponse, LanguageModel, Message, Role, StreamChunk,
    TokenUsage,
};

use crate::LlmError;

/// Backend configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub model: String,
    /// Used when the request does not set one
    pub temperature: f32,
    pub num_ctx: u32,
    /// Used when the request does not set `max_tokens`
    pub num_predict: u32,
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
    /// Keep the model loaded between calls ("5m", "1h", "-1", "0")
    pub keep_alive: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for OllamaConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            num_ctx: config.num_ctx,
            num_predict: config.num_predict,
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            keep_alive: config.keep_alive.clone(),
        }
    }
}

pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    fn chat_request(&self, request: &GenerateRequest, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream,
            format: request.json_mode.then(|| "json".to_string()),
            options: Some(OllamaOptions {
                temperature: Some(request.temperature.unwrap_or(self.config.temperature)),
                num_ctx: Some(self.config.num_ctx),
                num_predict: Some(request.max_tokens.unwrap_or(self.config.num_predict) as i32),
            }),
            keep_alive: Some(self.config.keep_alive.clone()),
            think: Some(false),
        }
    }

    /// Non-streaming chat with retry
    pub async fn chat(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = self.chat_request(request, false);

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    model = %self.config.model,
                    "LLM request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.config.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&body).await {
                Ok(response) => {
                    let usage = match (response.prompt_eval_count, response.eval_count) {
                        (Some(p), Some(c)) => Some(TokenUsage::new(p, c)),
                        _ => None,
                    };
                    return Ok(GenerateResponse {
                        text: response.message.content,
                        finish_reason: finish_reason(response.done_reason.as_deref(), response.done),
                        usage,
                    });
                }
                Err(e) if Self::is_retryable(&e) => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    async fn execute_request(
        &self,
        request: &OllamaChatRequest,
    ) -> Result<OllamaChatResponse, LlmError> {
        let response = self
            .client
            .post(self.api_url("/chat"))
            .json(request)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    /// 5xx maps to a retryable network error, 4xx to an API error
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(LlmError::Network(format!("Server error {}: {}", status, error)));
        }
        Err(LlmError::Api(format!("{}: {}", status, error)))
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    /// Streaming chat; yields text deltas and a final chunk
    pub fn chat_stream<'a>(
        &'a self,
        request: GenerateRequest,
    ) -> impl Stream<Item = Result<StreamChunk, LlmError>> + Send + 'a {
        let body = self.chat_request(&request, true);

        async_stream::stream! {
            let response = match self
                .client
                .post(self.api_url("/chat"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    yield Err(LlmError::from(e));
                    return;
                }
            };
            let response = match Self::check_status(response).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer = LineBuffer::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LlmError::from(e));
                        return;
                    }
                };

                for line in buffer.push(&chunk) {
                    match parse_stream_line(&line) {
                        Ok(Some(parsed)) => {
                            let done = parsed.done;
                            if !parsed.message.content.is_empty() {
                                yield Ok(StreamChunk::text(parsed.message.content));
                            }
                            if done {
                                yield Ok(StreamChunk::final_chunk(finish_reason(
                                    parsed.done_reason.as_deref(),
                                    true,
                                )));
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            // Body ended without a `done` line
            match buffer.finish().as_deref().map(parse_stream_line) {
                Some(Ok(Some(parsed))) => {
                    if !parsed.message.content.is_empty() {
                        yield Ok(StreamChunk::text(parsed.message.content));
                    }
                    yield Ok(StreamChunk::final_chunk(finish_reason(parsed.done_reason.as_deref(), parsed.done)));
                }
                Some(Err(e)) => {
                    yield Err(e);
                }
                _ => {
                    yield Err(LlmError::InvalidResponse("Stream ended before completion".to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaBackend {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> qa_assistant_core::Result<GenerateResponse> {
        let response = self.chat(&request).await?;
        tracing::debug!(
            model = %self.config.model,
            chars = response.text.len(),
            "Generation complete"
        );
        Ok(response)
    }

    fn generate_stream<'a>(
        &'a self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = qa_assistant_core::Result<StreamChunk>> + Send + 'a>> {
        Box::pin(
            self.chat_stream(request)
                .map(|item| item.map_err(qa_assistant_core::Error::from)),
        )
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn finish_reason(done_reason: Option<&str>, done: bool) -> FinishReason {
    match done_reason {
        Some("length") => FinishReason::Length,
        Some(_) => FinishReason::Stop,
        None if done => FinishReason::Stop,
        None => FinishReason::Length,
    }
}

fn parse_stream_line(line: &str) -> Result<Option<OllamaStreamChunk>, LlmError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if let Ok(error) = serde_json::from_str::<OllamaErrorLine>(line) {
        return Err(LlmError::Api(error.error));
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

/// Splits a byte stream into complete lines; a line may span chunks
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
    /// Disable extended thinking for reasoning models
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorLine {
    error: String,
}
