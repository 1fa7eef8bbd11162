//! Request and response payloads exchanged with external collaborators:
//! transcription, generation, synthesis, scoring, and the media room service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::persona::PersonaSnapshot;
use crate::scenario::{Difficulty, Profession};

/// Pipeline stage a collaborator call belongs to. Used for timeouts and error
/// attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transcription,
    Generation,
    Synthesis,
    Scoring,
    Room,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Transcription => write!(f, "transcription"),
            Stage::Generation => write!(f, "generation"),
            Stage::Synthesis => write!(f, "synthesis"),
            Stage::Scoring => write!(f, "scoring"),
            Stage::Room => write!(f, "room"),
        }
    }
}

/// Failure of a single collaborator call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("{stage} request failed: {message}")]
    Failure { stage: Stage, message: String },

    #[error("{stage} returned an unusable response: {message}")]
    InvalidResponse { stage: Stage, message: String },
}

impl GatewayError {
    pub fn stage(&self) -> Stage {
        match self {
            GatewayError::Timeout { stage, .. }
            | GatewayError::Failure { stage, .. }
            | GatewayError::InvalidResponse { stage, .. } => *stage,
        }
    }

    pub fn failure(stage: Stage, message: impl Into<String>) -> Self {
        GatewayError::Failure {
            stage,
            message: message.into(),
        }
    }

    pub fn invalid(stage: Stage, message: impl Into<String>) -> Self {
        GatewayError::InvalidResponse {
            stage,
            message: message.into(),
        }
    }
}

/// Hints passed to the transcription service alongside the audio.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionContext {
    pub profession: Profession,
    pub language: Option<String>,
    /// Client-side transcript, if the browser produced one.
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

/// Completion request produced by the persona prompt builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<PromptMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl GenerationRequest {
    /// The final user-role message, i.e. the text the persona is replying to.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == PromptRole::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub text: String,
    pub confidence: f32,
    #[serde(default)]
    pub emotion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub emotion: Option<String>,
}

/// One piece of synthesized speech. Chunks are emitted in order and exactly
/// the last one carries `is_final`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub format: String,
    pub is_final: bool,
}

/// Input to the scoring collaborator at session completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    pub transcript: String,
    pub persona: PersonaSnapshot,
    pub profession: Profession,
    pub difficulty: Difficulty,
    pub scenario_type: String,
    pub duration_seconds: u64,
}

/// Assessment produced at session completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub overall_score: u32,
    pub detailed_scores: BTreeMap<String, u32>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// True when the scoring collaborator was unavailable and a fixed
    /// placeholder was used.
    #[serde(default)]
    pub is_default: bool,
}

impl Feedback {
    /// Placeholder assessment used when scoring fails or times out.
    pub fn placeholder() -> Self {
        let detailed_scores = [
            "communication",
            "language",
            "clinical_knowledge",
            "professional_interaction",
        ]
        .into_iter()
        .map(|k| (k.to_string(), 75))
        .collect();
        Self {
            overall_score: 300,
            detailed_scores,
            strengths: vec![
                "Good use of medical terminology".to_string(),
                "Clear communication style".to_string(),
                "Appropriate professional demeanor".to_string(),
            ],
            improvements: vec![
                "Expand vocabulary range".to_string(),
                "Practice active listening techniques".to_string(),
                "Develop more detailed questioning skills".to_string(),
            ],
            summary: None,
            is_default: true,
        }
    }
}

/// Request for a media room for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomRequest {
    pub room_name: String,
    pub participant: String,
    pub user_id: String,
    pub scenario_id: String,
}

/// A provisioned room. The join token is handed to the client once and never
/// stored on the session snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomReservation {
    pub room_name: String,
    pub join_token: String,
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_feedback_shape() {
        let fb = Feedback::placeholder();
        assert!(fb.is_default);
        assert_eq!(fb.overall_score, 300);
        assert_eq!(fb.detailed_scores.len(), 4);
        assert!(fb.detailed_scores.values().all(|&v| v == 75));
        assert_eq!(fb.strengths.len(), 3);
        assert_eq!(fb.improvements.len(), 3);
    }

    #[test]
    fn test_gateway_error_stage() {
        let err = GatewayError::Timeout {
            stage: Stage::Generation,
            seconds: 30,
        };
        assert_eq!(err.stage(), Stage::Generation);
        assert_eq!(err.to_string(), "generation timed out after 30s");
    }

    #[test]
    fn test_last_user_message() {
        let req = GenerationRequest {
            system: "sys".to_string(),
            messages: vec![
                PromptMessage { role: PromptRole::User, content: "first".to_string() },
                PromptMessage { role: PromptRole::Assistant, content: "reply".to_string() },
                PromptMessage { role: PromptRole::User, content: "second".to_string() },
            ],
            max_tokens: 150,
            temperature: 0.8,
            stop_sequences: vec![],
        };
        assert_eq!(req.last_user_message(), Some("second"));
    }
}
