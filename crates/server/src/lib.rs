//! QA Assistant Server
//!
//! HTTP endpoints for sessions and chat, with Server-Sent Events for
//! streamed answers.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::{
    init_metrics, metrics_handler, record_answer, record_generation_error, record_request,
    record_retrieval_error, set_active_sessions,
};
pub use session::{Session, SessionManager};
pub use state::{AppState, Components};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use qa_assistant_agent::AgentError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Answer timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::Session(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Generation(_) => StatusCode::BAD_GATEWAY,
            ServerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AgentError> for ServerError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::GenerationFailure(msg) => ServerError::Generation(msg),
            AgentError::Cancelled => ServerError::Timeout,
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<qa_assistant_core::Error> for ServerError {
    fn from(err: qa_assistant_core::Error) -> Self {
        ServerError::from(AgentError::from(err))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
