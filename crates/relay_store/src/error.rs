//! Error taxonomy for the relay store (spec.md §4.6, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors raised while ingesting or retrieving relay messages.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The envelope's `id` has already been seen (§4.6 step 3, replay
    /// defense).
    #[error("duplicate envelope id")]
    Duplicate,

    /// `timestamp` lies outside the acceptance window (§4.3).
    #[error("envelope timestamp too old")]
    TooOld,

    /// `timestamp` lies outside the acceptance window (§4.3), in the future.
    #[error("envelope timestamp too new")]
    TooNew,

    /// The envelope failed shape validation.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The envelope exceeds the configured size ceiling.
    #[error("envelope too large")]
    TooLarge,

    /// A signature was missing, malformed, or did not recover to an
    /// authorized principal.
    #[error("auth error: {0}")]
    AuthError(String),

    /// No message or mailbox exists for the given id/address.
    #[error("not found")]
    NotFound,

    /// The underlying node rejected the operation.
    #[error(transparent)]
    Node(#[from] node_core::NodeError),
}

impl RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Duplicate | Self::TooOld | Self::TooNew | Self::InvalidEnvelope(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::AuthError(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Node(err) => StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// A short machine-readable code for this error, distinct from the
    /// human-readable [`std::fmt::Display`] message (§8 scenario 3 expects
    /// `400 Duplicate`/`400 Too Old` specifically, not just any 400).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Duplicate => "Duplicate",
            Self::TooOld => "Too Old",
            Self::TooNew => "Too New",
            Self::InvalidEnvelope(_) => "Invalid",
            Self::TooLarge => "Too Large",
            Self::AuthError(_) => "Unauthorized",
            Self::NotFound => "Not Found",
            Self::Node(_) => "Internal",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.code(), "message": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_maps_to_400() {
        assert_eq!(RelayError::Duplicate.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RelayError::Duplicate.code(), "Duplicate");
    }

    #[test]
    fn too_large_maps_to_413() {
        assert_eq!(RelayError::TooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn auth_error_maps_to_401() {
        assert_eq!(RelayError::AuthError("bad sig".to_string()).status_code(), StatusCode::UNAUTHORIZED);
    }
}
