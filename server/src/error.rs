//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] tether_engine::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(tether_engine::Error::NotFound(_)) | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::Engine(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn response_body(&self) -> ErrorResponse {
        match self {
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                ErrorResponse {
                    error: e.to_string(),
                    details: None,
                }
            }
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::MethodNotAllowed(msg) => ErrorResponse {
                error: msg.clone(),
                details: None,
            },
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ErrorResponse {
                    error: "Internal server error".to_string(),
                    details: Some(msg.clone()),
                }
            }
        }
    }

    /// The JSON error body, as sent over HTTP and WebSocket.
    pub fn body(&self) -> Value {
        serde_json::to_value(self.response_body()).unwrap_or(Value::Null)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(self.response_body());
        (self.status(), body).into_response()
    }
}

impl From<AppError> for tether_engine::Error {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Engine(e) => e,
            AppError::NotFound(msg) => tether_engine::Error::NotFound(msg),
            other => tether_engine::Error::Transport(other.to_string()),
        }
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
