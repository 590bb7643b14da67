//! Error taxonomy for the adapter's own routes (`/query`, `/batch`,
//! `/health`, `/metrics`). Replication and relay errors are handled by
//! their own crates' `IntoResponse` impls.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type for adapter-owned routes.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors the adapter's own handlers can raise.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The request body failed to decode as the expected shape, or named
    /// a malformed `databaseId`.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A query parameter carried a value the rate limiter couldn't
    /// decode as a tier/key.
    #[error("rate limit error: {0}")]
    RateLimit(#[from] rate_limiter::RateLimiterError),

    /// The underlying node rejected the operation.
    #[error(transparent)]
    Node(#[from] node_core::NodeError),
}

impl AdapterError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::RateLimit(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Node(err) => StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "ValidationError",
            Self::RateLimit(_) => "Internal",
            Self::Node(err) => match err {
                node_core::NodeError::NotFound { .. } => "NotFound",
                node_core::NodeError::ValidationError { .. } => "ValidationError",
                node_core::NodeError::NameTaken { .. } => "NameTaken",
                node_core::NodeError::AuthError { .. } => "AuthError",
                node_core::NodeError::RateLimitExceeded { .. } => "RateLimitExceeded",
                node_core::NodeError::SqlError { .. } => "SqlError",
                node_core::NodeError::NodeBehind { .. } => "NodeBehind",
                node_core::NodeError::HashChainBroken { .. } => "HashChainBroken",
                node_core::NodeError::SchemaMismatch { .. } => "SchemaMismatch",
                node_core::NodeError::Unavailable { .. } => "Unavailable",
                node_core::NodeError::Internal { .. } => "Internal",
            },
        }
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(serde_json::json!({ "error": self.code(), "message": self.to_string() }))).into_response();
        if let Self::Node(node_core::NodeError::RateLimitExceeded { retry_after_secs }) = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_is_400() {
        assert_eq!(AdapterError::ValidationError("bad".to_string()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn node_behind_is_409() {
        let err = AdapterError::Node(node_core::NodeError::NodeBehind { required: 5, current: 1 });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "NodeBehind");
    }
}
