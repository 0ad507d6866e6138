//! Clip job orchestration.
//!
//! This crate provides:
//! - Dispatcher: validation, submission, cancellation, status and subscriptions
//! - Worker pool: bounded slots draining the FIFO intake queue
//! - Pipelines for manual clips, scene detection and scene clips
//! - Cleanup manager with scoped artifact release
//! - Watchdog for stalled jobs, retention and snapshots
//! - Graceful shutdown and snapshot restore

pub mod active;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
mod pipeline;
pub mod pool;
pub mod retry;
pub mod watchdog;

pub use active::{AbortReason, ActiveJobs};
pub use cleanup::{ArtifactScope, CleanupManager, CleanupStats, ReleaseReport};
pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use dispatcher::{CancelOutcome, Dispatcher};
pub use engine::ClipEngine;
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, JobLogger};
pub use pool::WorkerPool;
