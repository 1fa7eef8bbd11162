//! Realtime wire protocol between the client and the session orchestrator.
//!
//! Every message is a JSON object `{type, timestamp, sessionId, data}`.
//! Outbound messages also carry `seq`, a per-session monotonically increasing
//! number used for resume and acknowledgement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::gateway::Feedback;
use crate::session::SessionStatus;

/// Raw inbound message as received on the socket.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioPayload {
    /// Base64-encoded audio bytes.
    #[serde(alias = "audioData")]
    pub audio: String,
    /// Client-side transcript hint.
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextPayload {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AckPayload {
    pub seq: u64,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    SessionStart,
    Audio(AudioPayload),
    Text(TextPayload),
    Ping,
    Ack(AckPayload),
}

impl ClientCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::SessionStart => "session_start",
            ClientCommand::Audio(_) => "audio",
            ClientCommand::Text(_) => "text",
            ClientCommand::Ping => "ping",
            ClientCommand::Ack(_) => "ack",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

impl ClientMessage {
    /// Parse a text frame into a message envelope.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Decode the typed payload for this message's `type`.
    pub fn into_command(self) -> Result<ClientCommand, ProtocolError> {
        match self.kind.as_str() {
            "session_start" => Ok(ClientCommand::SessionStart),
            "ping" => Ok(ClientCommand::Ping),
            "audio" => {
                let audio: AudioPayload = payload("audio", self.data)?;
                if audio.audio.is_empty() {
                    return Err(ProtocolError::InvalidAudio("empty audio".to_string()));
                }
                Ok(ClientCommand::Audio(audio))
            }
            "text" => {
                let text: TextPayload = payload("text", self.data)?;
                if text.text.trim().is_empty() {
                    return Err(ProtocolError::InvalidPayload {
                        kind: "text".to_string(),
                        message: "text must not be empty".to_string(),
                    });
                }
                Ok(ClientCommand::Text(text))
            }
            "ack" => Ok(ClientCommand::Ack(payload("ack", self.data)?)),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Coarse audio quality bucket derived from transcription confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Good,
    Fair,
    Poor,
}

impl AudioQuality {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.8 {
            AudioQuality::Good
        } else if confidence >= 0.5 {
            AudioQuality::Fair
        } else {
            AudioQuality::Poor
        }
    }
}

/// Outbound event, before sequencing.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionJoined {
        status: SessionStatus,
        persona_name: String,
        resumed: bool,
        last_seq: u64,
    },
    SessionStarted {
        started_at: DateTime<Utc>,
        room_name: String,
    },
    Transcription {
        text: String,
        confidence: f32,
        turn: u64,
    },
    AudioQuality {
        confidence: f32,
        level: AudioQuality,
        bytes: usize,
    },
    AiResponse {
        text: String,
        confidence: f32,
        emotion: Option<String>,
        turn: u64,
        fallback: bool,
    },
    AiGreeting {
        text: String,
        emotion: Option<String>,
        turn: u64,
    },
    TtsChunk {
        /// Base64-encoded audio.
        audio: String,
        format: String,
        sequence: u32,
        is_final: bool,
        turn: u64,
    },
    SessionCompleted {
        duration_seconds: u64,
        feedback: Feedback,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl ServerEvent {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionJoined { .. } => "session_joined",
            ServerEvent::SessionStarted { .. } => "session_started",
            ServerEvent::Transcription { .. } => "transcription",
            ServerEvent::AudioQuality { .. } => "audio_quality",
            ServerEvent::AiResponse { .. } => "ai_response",
            ServerEvent::AiGreeting { .. } => "ai_greeting",
            ServerEvent::TtsChunk { .. } => "tts_chunk",
            ServerEvent::SessionCompleted { .. } => "session_completed",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
        }
    }

    /// Whether this event belongs to the session stream (sequenced and
    /// replayable) rather than a single connection.
    pub fn is_session_scoped(&self) -> bool {
        !matches!(
            self,
            ServerEvent::SessionJoined { .. } | ServerEvent::Pong
        )
    }

    fn data(&self) -> Value {
        match self {
            ServerEvent::SessionJoined {
                status,
                persona_name,
                resumed,
                last_seq,
            } => json!({
                "status": status,
                "persona_name": persona_name,
                "resumed": resumed,
                "last_seq": last_seq,
            }),
            ServerEvent::SessionStarted {
                started_at,
                room_name,
            } => json!({ "started_at": started_at, "room_name": room_name }),
            ServerEvent::Transcription {
                text,
                confidence,
                turn,
            } => json!({ "text": text, "confidence": confidence, "turn": turn }),
            ServerEvent::AudioQuality {
                confidence,
                level,
                bytes,
            } => json!({ "confidence": confidence, "level": level, "bytes": bytes }),
            ServerEvent::AiResponse {
                text,
                confidence,
                emotion,
                turn,
                fallback,
            } => json!({
                "text": text,
                "confidence": confidence,
                "emotion": emotion,
                "turn": turn,
                "fallback": fallback,
            }),
            ServerEvent::AiGreeting {
                text,
                emotion,
                turn,
            } => json!({ "text": text, "emotion": emotion, "turn": turn }),
            ServerEvent::TtsChunk {
                audio,
                format,
                sequence,
                is_final,
                turn,
            } => json!({
                "audio": audio,
                "format": format,
                "sequence": sequence,
                "final": is_final,
                "turn": turn,
            }),
            ServerEvent::SessionCompleted {
                duration_seconds,
                feedback,
            } => json!({ "duration_seconds": duration_seconds, "feedback": feedback }),
            ServerEvent::Error { code, message } => json!({ "code": code, "message": message }),
            ServerEvent::Pong => json!({}),
        }
    }

    /// Wrap the event for the wire.
    pub fn into_envelope(self, session_id: Option<Uuid>, seq: Option<u64>) -> Envelope {
        Envelope {
            kind: self.kind().to_string(),
            timestamp: Utc::now(),
            session_id,
            seq,
            data: self.data(),
        }
    }
}

/// Outbound wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub data: Value,
}
