//! Structured job logging and tracing setup.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reelcut_models::{JobId, JobKind};

/// Initialize the global subscriber: JSON when `LOG_FORMAT=json`, ANSI text
/// otherwise. `default_directive` applies when `RUST_LOG` is unset.
pub fn init_tracing(default_directive: &str) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    if use_json {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .try_init();
    }
}

/// Consistent lifecycle log lines for one job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind: kind.as_str(),
        }
    }

    pub fn log_start(&self, slot: usize) {
        info!(job_id = %self.job_id, kind = self.kind, slot, "Job started");
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, kind = self.kind, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, kind = self.kind, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, kind = self.kind, "Job error: {}", message);
    }

    /// Log the terminal state a job reached.
    pub fn log_finished(&self, state: &str, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            kind = self.kind,
            state,
            elapsed_secs,
            "Job finished"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span wrapping the whole execution of the job.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, kind = self.kind)
    }
}
