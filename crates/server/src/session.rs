//! Session management
//!
//! Each session owns a `ConversationPipeline` with its own history. Turns
//! within a session run one at a time; sessions run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Mutex};

use qa_assistant_agent::{AgentError, ConversationPipeline};
use qa_assistant_core::{AnswerRecord, Turn};

use crate::metrics::set_active_sessions;
use crate::ServerError;

/// Session state
pub struct Session {
    pub id: String,
    pipeline: ConversationPipeline,
    /// Serializes turns so history is appended in request order
    turn: Mutex<()>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    last_activity: RwLock<Instant>,
    active: RwLock<bool>,
}

impl Session {
    pub fn new(id: impl Into<String>, pipeline: ConversationPipeline) -> Self {
        Self {
            id: id.into(),
            pipeline,
            turn: Mutex::new(()),
            created_at: chrono::Utc::now(),
            last_activity: RwLock::new(Instant::now()),
            active: RwLock::new(true),
        }
    }

    /// Answer one message, bounded by the pipeline's answer timeout
    pub async fn answer(&self, message: &str) -> Result<AnswerRecord, AgentError> {
        let _turn = self.turn.lock().await;
        self.touch();
        let result = self.pipeline.answer_with_default_timeout(message).await;
        self.touch();
        result
    }

    /// Streamed variant of `answer`; fragments go to `tokens`
    pub async fn answer_stream(
        &self,
        message: &str,
        tokens: mpsc::Sender<String>,
    ) -> Result<AnswerRecord, AgentError> {
        let _turn = self.turn.lock().await;
        self.touch();
        let limit = self.pipeline.options().answer_timeout;
        let result = match tokio::time::timeout(limit, self.pipeline.answer_stream(message, tokens))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(session_id = %self.id, "Streamed answer timed out");
                Err(AgentError::Cancelled)
            }
        };
        self.touch();
        result
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.pipeline.history().turns()
    }

    pub fn turn_count(&self) -> usize {
        self.pipeline.history().len()
    }

    /// Drop the history once any in-flight turn has committed
    pub async fn clear_history(&self) {
        let _turn = self.turn.lock().await;
        self.pipeline.history().clear();
        self.touch();
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    pub fn close(&self) {
        *self.active.write() = false;
    }

    pub fn is_active(&self) -> bool {
        *self.active.read()
    }
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self::with_config(max_sessions, Duration::from_secs(3600), Duration::from_secs(300))
    }

    pub fn with_config(
        max_sessions: usize,
        session_timeout: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            cleanup_interval,
        }
    }

    /// Start a background task that periodically removes expired sessions.
    ///
    /// Send `true` on the returned channel to stop it.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = manager.count(),
                                "Session cleanup"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Register a new session around `pipeline`
    pub fn create(&self, pipeline: ConversationPipeline) -> Result<Arc<Session>, ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);

            if sessions.len() >= self.max_sessions {
                return Err(ServerError::InvalidRequest("Max sessions reached".to_string()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(&id, pipeline));
        sessions.insert(id.clone(), session.clone());
        set_active_sessions(sessions.len());

        tracing::info!(session_id = %id, "Created session");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session; returns whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(id);
        set_active_sessions(sessions.len());
        match removed {
            Some(session) => {
                session.close();
                tracing::info!(session_id = %id, "Removed session");
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Remove expired sessions; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions)
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                session.close();
                tracing::info!(session_id = %id, "Expired session");
            }
        }
        set_active_sessions(sessions.len());
        expired.len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}
