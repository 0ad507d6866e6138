//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use reelcut_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match &e {
            WorkerError::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),
            WorkerError::NotFound(_) => ApiError::NotFound(e.to_string()),
            WorkerError::AlreadyTerminal(_) | WorkerError::NotTerminal(..) => ApiError::Conflict(e.to_string()),
            WorkerError::ShuttingDown => ApiError::Unavailable(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub detail: String,
    pub code: &'static str,
}

/// Message of an internal error, kept off the response body and attached as
/// an extension instead. Non-production routers put it back in the body.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        if let ApiError::Internal(_) = &self {
            let body = ErrorResponse {
                detail: "An internal error occurred".to_string(),
                code,
            };
            let mut response = (status, Json(body)).into_response();
            response.extensions_mut().insert(InternalDetail(self.to_string()));
            return response;
        }

        let body = ErrorResponse {
            detail: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}
