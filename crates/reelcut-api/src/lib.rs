//! Axum HTTP API server for the clip engine.
//!
//! This crate provides:
//! - REST endpoints for submitting, listing, canceling and acknowledging jobs
//! - A WebSocket status stream per job
//! - Prometheus metrics and health probes

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
