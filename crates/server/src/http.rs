//! HTTP Endpoints
//!
//! REST API for sessions and chat, plus an SSE variant of chat that emits
//! `token` events followed by one `answer` (or `error`) event.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use qa_assistant_agent::AgentError;
use qa_assistant_core::AnswerRecord;

use crate::metrics::{
    metrics_handler, record_answer, record_generation_error, record_request,
    record_retrieval_error,
};
use crate::session::Session;
use crate::state::AppState;
use crate::ServerError;

/// Buffered token fragments per streamed answer
const TOKEN_BUFFER: usize = 64;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );

    Router::new()
        // Sessions
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/history", get(session_history))
        .route("/api/sessions/:id/clear", post(clear_session))
        // Chat
        .route("/api/chat/:session_id", post(chat))
        .route("/api/chat/:session_id/stream", post(chat_stream))
        // Lookup and FAQ
        .route("/api/lookup", post(lookup))
        .route("/api/faq", get(faq))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configured origins
///
/// - `enabled == false` allows everything (development only)
/// - No valid origins falls back to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

fn find_session(state: &AppState, id: &str) -> Result<std::sync::Arc<Session>, ServerError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| ServerError::Session(format!("Unknown session: {}", id)))
}

fn validate_message(message: &str) -> Result<&str, ServerError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ServerError::InvalidRequest("Message must not be empty".to_string()));
    }
    Ok(message)
}

fn observe_answer(record: &AnswerRecord, elapsed: Duration) {
    record_answer(record.signature, elapsed);
    if record.retrieval_error.is_some() {
        record_retrieval_error();
    }
}

fn observe_failure(error: &AgentError) {
    if matches!(error, AgentError::GenerationFailure(_)) {
        record_generation_error();
    }
}

/// Create session
async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    record_request("create_session");
    let session = state.sessions.create(state.components.new_pipeline())?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session_id": session.id,
            "created_at": session.created_at,
        })),
    ))
}

/// Get session info
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let session = find_session(&state, &id)?;

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "active": session.is_active(),
        "turn_count": session.turn_count(),
        "created_at": session.created_at,
    })))
}

/// Delete session
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if !state.sessions.remove(&id) {
        return Err(ServerError::Session(format!("Unknown session: {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// List sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let session = find_session(&state, &id)?;
    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "turns": session.turns(),
    })))
}

async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    find_session(&state, &id)?.clear_history().await;
    Ok(StatusCode::NO_CONTENT)
}

/// Chat request
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

/// Chat endpoint
async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<AnswerRecord>, ServerError> {
    record_request("chat");
    let message = validate_message(&request.message)?;
    let session = find_session(&state, &session_id)?;

    let started = Instant::now();
    match session.answer(message).await {
        Ok(record) => {
            observe_answer(&record, started.elapsed());
            Ok(Json(record))
        }
        Err(e) => {
            observe_failure(&e);
            Err(e.into())
        }
    }
}

/// Streamed chat endpoint
///
/// The answer runs on its own task so a disconnecting client only drops the
/// token receiver, which the pipeline sees as cancellation.
async fn chat_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    record_request("chat_stream");
    let message = validate_message(&request.message)?.to_string();
    let session = find_session(&state, &session_id)?;

    let (tx, mut rx) = mpsc::channel::<String>(TOKEN_BUFFER);
    let started = Instant::now();
    let task = tokio::spawn(async move { session.answer_stream(&message, tx).await });

    let stream = async_stream::stream! {
        while let Some(delta) = rx.recv().await {
            yield Ok(json_event("token", &serde_json::json!({ "delta": delta })));
        }

        match task.await {
            Ok(Ok(record)) => {
                observe_answer(&record, started.elapsed());
                yield Ok(json_event("answer", &record));
            }
            Ok(Err(e)) => {
                observe_failure(&e);
                let error = ServerError::from(e);
                yield Ok(json_event("error", &serde_json::json!({ "error": error.to_string() })));
            }
            Err(e) => {
                tracing::error!(error = %e, "Answer task failed");
                yield Ok(json_event("error", &serde_json::json!({ "error": "internal error" })));
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn json_event<T: serde::Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, event = name, "Failed to encode SSE payload");
            Event::default().event("error").data("encoding error")
        })
}

#[derive(Debug, Deserialize)]
struct LookupRequest {
    query: String,
}

/// Title-then-content lookup; empty without a title index
async fn lookup(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    record_request("lookup");
    let query = validate_message(&request.query)?;

    let documents = match &state.components.titles {
        Some(titles) => titles.lookup(query).await?,
        None => Vec::new(),
    };

    Ok(Json(serde_json::json!({ "documents": documents })))
}

async fn faq(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "faq": state.config.pipeline.faq }))
}

/// Liveness: the process is up and serving
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "sessions": { "status": "ok", "count": state.sessions.count() },
                "vector_store": { "backend": state.config.vector_store.backend },
                "llm": { "model": state.components.llm.model_name() },
            }
        })),
    )
}

/// Readiness: the language model answers
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let llm = state.components.llm.clone();
    let llm_status =
        match tokio::time::timeout(Duration::from_secs(2), llm.is_available()).await {
            Ok(true) => "ok",
            Ok(false) => "unreachable",
            Err(_) => "timeout",
        };
    let ready = llm_status == "ok";

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "sessions": { "status": "ok", "count": state.sessions.count() },
                "llm_backend": { "status": llm_status, "model": llm.model_name() },
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::state::tests::test_state;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send(app.clone(), Request::post("/api/sessions").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::CREATED);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        value["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_chat_records_turns() {
        let app = create_router(test_state());
        let id = new_session(&app).await;

        let (status, body) =
            send(app.clone(), post_json(&format!("/api/chat/{}", id), serde_json::json!({"message": "Ciao"}))).await;
        assert_eq!(status, StatusCode::OK);
        let record: AnswerRecord = serde_json::from_str(&body).unwrap();
        assert_eq!(record.answer, "Ciao! Sono qui per aiutarti.");
        assert!(record.context.is_empty());

        let (status, body) = send(app.clone(), get_request(&format!("/api/sessions/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        let info: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(info["turn_count"], 2);

        let (status, body) = send(app.clone(), get_request(&format!("/api/sessions/{}/history", id))).await;
        assert_eq!(status, StatusCode::OK);
        let history: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(history["turns"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            app.clone(),
            Request::post(format!("/api/sessions/{}/clear", id)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let app = create_router(test_state());
        let (status, body) =
            send(app, post_json("/api/chat/missing", serde_json::json!({"message": "Ciao"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("error"));
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let app = create_router(test_state());
        let id = new_session(&app).await;
        let (status, _) =
            send(app, post_json(&format!("/api/chat/{}", id), serde_json::json!({"message": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_emits_tokens_then_answer() {
        let app = create_router(test_state());
        let id = new_session(&app).await;

        let (status, body) = send(
            app,
            post_json(&format!("/api/chat/{}/stream", id), serde_json::json!({"message": "Ciao"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let first_token = body.find("event: token").unwrap();
        let answer = body.find("event: answer").unwrap();
        assert!(first_token < answer);
        assert!(!body.contains("event: error"));
    }

    #[tokio::test]
    async fn test_delete_session() {
        let app = create_router(test_state());
        let id = new_session(&app).await;

        let delete = Request::delete(format!("/api/sessions/{}", id)).body(Body::empty()).unwrap();
        let (status, _) = send(app.clone(), delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(app, get_request(&format!("/api/sessions/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lookup_without_title_index_is_empty() {
        let app = create_router(test_state());
        let (status, body) =
            send(app, post_json("/api/lookup", serde_json::json!({"query": "bando 2024"}))).await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(value["documents"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = create_router(test_state());
        let (status, body) = send(app.clone(), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));

        let (status, body) = send(app, get_request("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"ready\""));
    }

    #[tokio::test]
    async fn test_faq_lists_configured_prompts() {
        let app = create_router(test_state());
        let (status, body) = send(app, get_request("/api/faq")).await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(value["faq"].is_array());
    }
}
