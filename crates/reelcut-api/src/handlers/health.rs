//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness: the process is up and serving.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Outcome of one readiness check.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Check {
    Ok { latency_ms: u64 },
    Error { error: String },
}

impl Check {
    fn is_ok(&self) -> bool {
        matches!(self, Check::Ok { .. })
    }
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    /// Jobs waiting for a worker slot
    pub queued: usize,
    pub engine: Check,
    pub storage: Check,
}

/// Readiness: submissions are accepted and the output store is writable.
/// Responds 503 with the same body otherwise.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let engine = if state.dispatcher.is_accepting() {
        Check::Ok { latency_ms: 0 }
    } else {
        Check::Error {
            error: "engine is draining".to_string(),
        }
    };

    let started = Instant::now();
    let storage = match state.storage.health_check().await {
        Ok(()) => Check::Ok {
            latency_ms: started.elapsed().as_millis() as u64,
        },
        Err(e) => Check::Error { error: e.to_string() },
    };

    let ready = engine.is_ok() && storage.is_ok();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "degraded" },
            queued: state.dispatcher.queued(),
            engine,
            storage,
        }),
    )
}
