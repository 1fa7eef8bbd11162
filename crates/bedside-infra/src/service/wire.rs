//! JSON shapes spoken by the AI service and the room service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use bedside_types::persona::PersonaSnapshot;

#[derive(Debug, Serialize)]
pub(crate) struct TranscribeRequest<'a> {
    pub audio_data: String,
    pub profession: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TranscribeResponse {
    #[serde(alias = "transcript")]
    pub text: String,
    #[serde(default = "default_transcribe_confidence")]
    pub confidence: f32,
}

fn default_transcribe_confidence() -> f32 {
    0.8
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: &'a [String],
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    pub text: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TtsRequest<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TtsResponse {
    #[serde(alias = "audioData", alias = "audio")]
    pub audio_data: String,
    #[serde(default = "default_tts_format")]
    pub format: String,
}

fn default_tts_format() -> String {
    "mp3".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeedbackRequest<'a> {
    pub transcript: &'a str,
    pub patient_persona: &'a PersonaSnapshot,
    pub session_duration: u64,
    pub target_profession: String,
    pub difficulty_level: String,
    pub scenario_type: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedbackResponse {
    #[serde(alias = "overallScore")]
    pub overall_score: f64,
    #[serde(default, alias = "detailedScores")]
    pub detailed_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenRequest<'a> {
    pub room_name: &'a str,
    pub participant_name: &'a str,
    pub user_id: &'a str,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
    #[serde(default)]
    pub url: Option<String>,
}
