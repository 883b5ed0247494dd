//! Prometheus metrics
//!
//! The recorder is installed once per process; `/metrics` renders it.

use std::time::Duration;

use axum::http::StatusCode;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use qa_assistant_core::Signature;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Later calls return the first handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = PROMETHEUS.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_metrics();
        Ok::<_, metrics_exporter_prometheus::BuildError>(handle)
    });

    match handle {
        Ok(handle) => Some(handle.clone()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

fn describe_metrics() {
    describe_counter!("qa_assistant_requests_total", "HTTP requests by endpoint");
    describe_counter!("qa_assistant_answers_total", "Answers by branch signature");
    describe_histogram!(
        "qa_assistant_answer_latency_seconds",
        Unit::Seconds,
        "Time to produce an answer"
    );
    describe_counter!(
        "qa_assistant_retrieval_errors_total",
        "Answers degraded by retrieval failures"
    );
    describe_counter!(
        "qa_assistant_generation_errors_total",
        "Turns lost to generation failures"
    );
    describe_gauge!("qa_assistant_active_sessions", "Sessions held in memory");
}

/// GET /metrics
pub async fn metrics_handler() -> (StatusCode, String) {
    match PROMETHEUS.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled\n".to_string()),
    }
}

pub fn record_request(endpoint: &'static str) {
    counter!("qa_assistant_requests_total", "endpoint" => endpoint).increment(1);
}

pub fn record_answer(signature: Signature, elapsed: Duration) {
    counter!("qa_assistant_answers_total", "signature" => signature.as_str()).increment(1);
    histogram!("qa_assistant_answer_latency_seconds").record(elapsed.as_secs_f64());
}

pub fn record_retrieval_error() {
    counter!("qa_assistant_retrieval_errors_total").increment(1);
}

pub fn record_generation_error() {
    counter!("qa_assistant_generation_errors_total").increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!("qa_assistant_active_sessions").set(count as f64);
}
