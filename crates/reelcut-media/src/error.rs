//! Error types for media tool invocations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors returned by the media tool adapter.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("Tool execution failed: {message}")]
    ExecutionFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Operation canceled")]
    Canceled,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Create an execution failure error.
    pub fn execution_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Execution failure caused by output the adapter could not interpret.
    pub fn malformed_output(message: impl Into<String>) -> Self {
        Self::execution_failed(message, None, None)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ToolError::Canceled)
    }

    /// Human-readable detail including the stderr tail, for job error records.
    pub fn detail(&self) -> String {
        match self {
            ToolError::ExecutionFailed {
                message,
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => format!("{}: {}", message, stderr.trim()),
            other => other.to_string(),
        }
    }
}
