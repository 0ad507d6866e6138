//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{ack_job, cancel_job, create_job, get_job, health, list_jobs, ready, register_upload};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, expose_internal_errors, request_id, request_logging};
use crate::state::AppState;
use crate::ws::ws_job_status;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/uploads", post(register_upload))
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job).delete(cancel_job))
        .route("/jobs/:id/ack", post(ack_job));

    let ws_routes = Router::new().route("/ws/jobs/:id", get(ws_job_status));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let mut router = Router::new()
        .nest("/api", job_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes);
    if !state.config.is_production() {
        router = router.layer(middleware::from_fn(expose_internal_errors));
    }

    router
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
