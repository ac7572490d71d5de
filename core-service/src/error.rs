//! API error types.

use axum::http::header::CONTENT_RANGE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bridge_traits::BridgeError;
use core_cache::CacheError;
use provider_netease::NeteaseError;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&CacheError> for ApiError {
    fn from(err: &CacheError) -> Self {
        match err {
            CacheError::Source(source) => ApiError::Upstream(source.to_string()),
            other => {
                error!(error = %other, "Cache operation failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::from(&err)
    }
}

impl From<Arc<CacheError>> for ApiError {
    fn from(err: Arc<CacheError>) -> Self {
        ApiError::from(err.as_ref())
    }
}

impl From<NeteaseError> for ApiError {
    fn from(err: NeteaseError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };

        match self {
            Self::RangeNotSatisfiable { size } => (
                status,
                [(CONTENT_RANGE, format!("bytes */{size}"))],
                Json(body),
            )
                .into_response(),
            _ => (status, Json(body)).into_response(),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
