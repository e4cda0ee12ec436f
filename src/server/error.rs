//! API error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::CacheError;
use crate::upstream::PopulateError;

/// Error returned by route handlers, rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: &self.message,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!(error = %err, "Cache lookup failed");
        match err {
            CacheError::FillFailed { .. } | CacheError::FillAbandoned { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Feature set directory is unavailable",
                "UPSTREAM_UNAVAILABLE",
            ),
            CacheError::Contention { .. } | CacheError::FillPanicked { .. } => {
                Self::internal("An internal error occurred")
            }
        }
    }
}

impl From<PopulateError> for ApiError {
    fn from(err: PopulateError) -> Self {
        tracing::error!(error = %err, "Upstream passthrough failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Feature set directory is unavailable",
            "UPSTREAM_UNAVAILABLE",
        )
    }
}
