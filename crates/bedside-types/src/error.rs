use thiserror::Error;
use uuid::Uuid;

use crate::session::{SessionEvent, SessionStatus};

/// Errors from session registry and lifecycle operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("session {id} is not active (status: {status})")]
    NotActive { id: Uuid, status: SessionStatus },

    #[error("session {id}: cannot apply '{event}' while {from}")]
    InvalidTransition {
        id: Uuid,
        from: SessionStatus,
        event: SessionEvent,
    },

    #[error("turn queue full for session {0}")]
    QueueFull(Uuid),

    #[error("scenario '{0}' not found")]
    ScenarioNotFound(String),

    #[error("session {id} failed: {reason}")]
    Fatal { id: Uuid, reason: String },

    #[error("room provisioning failed: {0}")]
    RoomUnavailable(String),
}

impl SessionError {
    /// Stable machine-readable code, used in error envelopes and `error` messages.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "SESSION_NOT_FOUND",
            SessionError::NotActive { .. } => "SESSION_NOT_ACTIVE",
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::QueueFull(_) => "QUEUE_FULL",
            SessionError::ScenarioNotFound(_) => "SCENARIO_NOT_FOUND",
            SessionError::Fatal { .. } => "FATAL_SESSION_ERROR",
            SessionError::RoomUnavailable(_) => "ROOM_UNAVAILABLE",
        }
    }
}

/// Errors from the connection multiplexer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    #[error("connection {0} not registered")]
    UnknownConnection(Uuid),

    #[error("connection {0} is not bound to a session")]
    Unbound(Uuid),

    #[error("join token rejected")]
    Unauthorized,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    pub fn code(&self) -> &'static str {
        match self {
            ConnectionError::UnknownConnection(_) => "UNKNOWN_CONNECTION",
            ConnectionError::Unbound(_) => "NOT_BOUND",
            ConnectionError::Unauthorized => "UNAUTHORIZED",
            ConnectionError::Session(e) => e.code(),
            ConnectionError::Protocol(e) => e.code(),
        }
    }
}

/// Errors decoding inbound client messages.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("invalid '{kind}' payload: {message}")]
    InvalidPayload { kind: String, message: String },

    #[error("invalid audio payload: {0}")]
    InvalidAudio(String),
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "MALFORMED_MESSAGE",
            ProtocolError::UnknownType(_) => "UNKNOWN_MESSAGE_TYPE",
            ProtocolError::InvalidPayload { .. } => "INVALID_PAYLOAD",
            ProtocolError::InvalidAudio(_) => "INVALID_AUDIO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        let id = Uuid::now_v7();
        assert_eq!(SessionError::NotFound(id).code(), "SESSION_NOT_FOUND");
        assert_eq!(SessionError::QueueFull(id).code(), "QUEUE_FULL");
        let err = SessionError::NotActive {
            id,
            status: SessionStatus::Completed,
        };
        assert_eq!(err.code(), "SESSION_NOT_ACTIVE");
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn test_connection_error_forwards_session_code() {
        let err: ConnectionError = SessionError::NotFound(Uuid::now_v7()).into();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = SessionError::InvalidTransition {
            id: Uuid::nil(),
            from: SessionStatus::Created,
            event: SessionEvent::Complete,
        };
        assert!(err.to_string().contains("cannot apply 'complete' while created"));
    }
}
