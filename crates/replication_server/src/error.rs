//! Error types for the replication server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving replication endpoints.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Missing or invalid peer authentication.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request (bad query params, malformed body, etc.).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested database does not exist on this node.
    #[error("unknown database")]
    UnknownDatabase,

    /// The node rejected the operation.
    #[error(transparent)]
    Node(#[from] node_core::NodeError),
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownDatabase => StatusCode::NOT_FOUND,
            Self::Node(err) => StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
