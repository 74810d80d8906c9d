//! Error types for the HTTP surface.
//!
//! [`ObserverError`] unifies every failure an HTTP handler can report and
//! converts into an Axum response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use officeclaw_core::DriverError;
use officeclaw_types::ErrorCode;

/// Errors that can occur in the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The request body or query was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The world refused the request with a protocol code.
    #[error("{}: {}", .code.as_str(), .message)]
    Rejected {
        /// Protocol error code.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },

    /// The simulation driver is gone.
    #[error("simulation unavailable: {source}")]
    Unavailable {
        /// Underlying driver error.
        #[from]
        source: DriverError,
    },

    /// A serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

const fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::NotAllowed => StatusCode::FORBIDDEN,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationFailed,
                msg.clone(),
            ),
            Self::Rejected { code, message } => (status_for(*code), *code, message.clone()),
            Self::Unavailable { source } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::Internal,
                source.to_string(),
            ),
            Self::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Internal,
                format!("JSON error: {e}"),
            ),
        };

        let body = serde_json::json!({
            "error": message,
            "code": code,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
