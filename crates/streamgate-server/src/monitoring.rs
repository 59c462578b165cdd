//! Process-level counters and the health/metrics HTTP surface.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Invocation counters, shared across transports.
pub struct Metrics {
    started: Instant,
    invocations: AtomicU64,
    blocked_calls: AtomicU64,
    upstream_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            invocations: AtomicU64::new(0),
            blocked_calls: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
        }
    }

    pub fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> Value {
        json!({
            "uptime_seconds": self.started.elapsed().as_secs(),
            "invocations": self.invocations.load(Ordering::Relaxed),
            "blocked_calls": self.blocked_calls.load(Ordering::Relaxed),
            "upstream_failures": self.upstream_failures.load(Ordering::Relaxed),
        })
    }
}

/// Router exposing `/health` and `/metrics`.
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Json<Value> {
    Json(metrics.snapshot())
}
