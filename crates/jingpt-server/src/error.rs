//! Error types for the JinGPT server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Message shown for any failure the caller cannot act on.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Errors that can occur while serving a request or starting up.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request lacks a usable credential.
    #[error("{0}")]
    Unauthorized(String),

    /// The request body is malformed or violates the conversation rules.
    #[error("{0}")]
    BadRequest(String),

    /// The server is misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (config file, listener).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Anything else that went wrong while handling a request.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using `ServerError`.
pub type Result<T> = std::result::Result<T, ServerError>;

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<jingpt::CoreError> for ServerError {
    fn from(err: jingpt::CoreError) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<jingpt::ConversationError> for ServerError {
    fn from(err: jingpt::ConversationError) -> Self {
        Self::BadRequest(format!("Invalid conversation: {err}"))
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: &'static str,
}

impl ServerError {
    const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Self::Io(_) | Self::Toml(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let error = if status.is_server_error() {
            tracing::error!(status = %status, code, error = %self, "Server error");
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            tracing::warn!(status = %status, code, error = %self, "Client error");
            self.to_string()
        };

        (status, Json(ErrorBody { error, code })).into_response()
    }
}
