//! Uniform JSON responses.
//!
//! Every error leaves the relay as `{"error": "<message>"}` with a matching
//! status code. Success bodies are either `status`/`message` pairs or
//! chat-message shaped `{"type": "message", "text": ...}` replies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Request-level failures.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A required target URL is not configured.
    #[error("{0} is not configured")]
    ConfigMissing(&'static str),

    #[error("Only POST method is allowed for this endpoint")]
    PostOnly,

    #[error("Request body is empty")]
    EmptyBody,

    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Failed to read request body")]
    BodyRead,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// Downstream delivery failed; `action` is e.g. "forward" or "echo".
    #[error("Failed to {action} webhook: {detail}")]
    Downstream { action: &'static str, detail: String },
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::ConfigMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::PostOnly => StatusCode::BAD_REQUEST,
            RelayError::EmptyBody => StatusCode::BAD_REQUEST,
            RelayError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::BodyRead => StatusCode::BAD_REQUEST,
            RelayError::InvalidSignature => StatusCode::UNAUTHORIZED,
            RelayError::MalformedJson(_) => StatusCode::BAD_REQUEST,
            RelayError::Downstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.to_string())
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Status/message success body.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub message: &'static str,
}

/// Chat-message shaped reply understood by Teams.
#[derive(Debug, Serialize)]
pub struct MessageReply {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl MessageReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "message",
            text: text.into(),
        }
    }
}

/// Write `body` as JSON with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_response(
        status,
        ErrorBody {
            error: message.into(),
        },
    )
}
