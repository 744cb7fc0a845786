//! Offline reporting library (benchmark summaries, token-parity reports,
//! shadow-divergence summaries) plus a thin ambient `/metrics`/`/healthz`
//! HTTP surface over the C7 counters.

pub mod benchmark;
pub mod shadow_report;
pub mod token_parity;

use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};

/// Builds the ambient metrics surface. Trimmed from the teacher's `app()`:
/// no model backend, no `/generate`/`/v1/chat/completions`/`/sse/generate`/
/// `/ws/generate` routes — the forward pass those serve is out of scope.
pub fn app() -> Router {
    sched_obs::init();
    Router::new().route("/healthz", get(|| async { "ok" })).route("/metrics", get(metrics))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    ([("content-type", encoder.format_type().to_string())], buffer)
}
