//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use bedside_types::error::{ConnectionError, SessionError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Session registry and lifecycle errors.
    Session(SessionError),
    /// WebSocket attach errors.
    Connection(ConnectionError),
    /// Missing or unusable caller identity.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl From<ConnectionError> for AppError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::Session(inner) => AppError::Session(inner),
            other => AppError::Connection(other),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {e}"))
    }
}

fn session_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::NotFound(_) | SessionError::ScenarioNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::NotActive { .. }
        | SessionError::InvalidTransition { .. }
        | SessionError::QueueFull(_) => StatusCode::CONFLICT,
        SessionError::Fatal { .. } | SessionError::RoomUnavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl AppError {
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Session(e) => (session_status(e), e.code(), e.to_string()),
            AppError::Connection(ConnectionError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid join token".to_string())
            }
            AppError::Connection(ConnectionError::Session(e)) => {
                (session_status(e), e.code(), e.to_string())
            }
            AppError::Connection(e) => (StatusCode::BAD_REQUEST, e.code(), e.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }
        let body = ApiResponse::error(code, &message, uuid::Uuid::now_v7().to_string(), 0);
        (status, body).into_response()
    }
}
