//! Clients for the AI service: transcription, persona replies, speech, and
//! feedback scoring.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::stream;

use bedside_core::gateway::{AudioStream, FeedbackScorer, ReplyGenerator, SpeechSynthesizer, Transcriber};
use bedside_types::gateway::{
    AudioChunk, Feedback, FeedbackRequest, GatewayError, GeneratedReply, GenerationRequest,
    PromptRole, Stage, SynthesisRequest, Transcript, TranscriptionContext,
};

use super::ServiceClient;
use super::wire;

/// Decoded audio is re-chunked to this size before it reaches the client.
pub const TTS_CHUNK_BYTES: usize = 16 * 1024;

pub struct HttpTranscriber {
    client: Arc<ServiceClient>,
}

impl HttpTranscriber {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }
}

impl Transcriber for HttpTranscriber {
    fn name(&self) -> &str {
        "ai-service"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        context: &TranscriptionContext,
    ) -> Result<Transcript, GatewayError> {
        let body = wire::TranscribeRequest {
            audio_data: STANDARD.encode(audio),
            profession: context.profession.to_string(),
            language: context.language.as_deref(),
            hint: context.hint.as_deref(),
        };
        let resp: wire::TranscribeResponse = self
            .client
            .post_json(Stage::Transcription, "/api/v1/transcribe", &body)
            .await?;

        Ok(Transcript {
            text: resp.text,
            confidence: resp.confidence.clamp(0.0, 1.0),
        })
    }
}

pub struct HttpReplyGenerator {
    client: Arc<ServiceClient>,
}

impl HttpReplyGenerator {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }
}

/// The generation endpoint takes a single prompt string.
fn flatten_prompt(request: &GenerationRequest) -> String {
    let mut prompt = request.system.clone();
    for message in &request.messages {
        let label = match message.role {
            PromptRole::System => continue,
            PromptRole::User => "Healthcare Professional",
            PromptRole::Assistant => "Patient",
        };
        prompt.push_str("\n\n");
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&message.content);
    }
    prompt.push_str("\n\nPatient Response:");
    prompt
}

fn finish_confidence(finish_reason: Option<&str>) -> f32 {
    match finish_reason {
        Some("stop") | Some("end_turn") | Some("stop_sequence") => 0.9,
        Some("length") | Some("max_tokens") => 0.6,
        _ => 0.75,
    }
}

impl ReplyGenerator for HttpReplyGenerator {
    fn name(&self) -> &str {
        "ai-service"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, GatewayError> {
        let body = wire::GenerateRequest {
            prompt: flatten_prompt(request),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop_sequences: &request.stop_sequences,
            stream: false,
        };
        let resp: wire::GenerateResponse = self
            .client
            .post_json(Stage::Generation, "/api/v1/llm/generate", &body)
            .await?;

        Ok(GeneratedReply {
            confidence: finish_confidence(resp.finish_reason.as_deref()),
            text: resp.text.trim().to_string(),
            emotion: None,
        })
    }
}

pub struct HttpSpeechSynthesizer {
    client: Arc<ServiceClient>,
}

impl HttpSpeechSynthesizer {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }
}

/// Split decoded audio into ordered chunks, marking the last one final.
fn into_chunks(data: Vec<u8>, format: &str) -> Vec<AudioChunk> {
    if data.is_empty() {
        return Vec::new();
    }
    let count = data.len().div_ceil(TTS_CHUNK_BYTES);
    data.chunks(TTS_CHUNK_BYTES)
        .enumerate()
        .map(|(i, piece)| AudioChunk {
            data: piece.to_vec(),
            format: format.to_string(),
            is_final: i + 1 == count,
        })
        .collect()
}

impl SpeechSynthesizer for HttpSpeechSynthesizer {
    fn name(&self) -> &str {
        "ai-service"
    }

    fn synthesize(&self, request: SynthesisRequest) -> AudioStream {
        let client = Arc::clone(&self.client);
        let fetch = async move {
            let body = wire::TtsRequest {
                text: &request.text,
                voice: request.voice.as_deref(),
                emotion: request.emotion.as_deref(),
            };
            let resp: wire::TtsResponse = client.post_json(Stage::Synthesis, "/api/v1/tts", &body).await?;
            let audio = STANDARD
                .decode(resp.audio_data.as_bytes())
                .map_err(|e| GatewayError::invalid(Stage::Synthesis, format!("audio is not base64: {e}")))?;
            if audio.is_empty() {
                return Err(GatewayError::invalid(Stage::Synthesis, "empty audio"));
            }
            Ok(into_chunks(audio, &resp.format))
        };

        Box::pin(futures_util::StreamExt::flat_map(
            stream::once(fetch),
            |result| -> AudioStream {
                match result {
                    Ok(chunks) => Box::pin(stream::iter(chunks.into_iter().map(Ok))),
                    Err(e) => Box::pin(stream::once(async move { Err(e) })),
                }
            },
        ))
    }
}

pub struct HttpFeedbackScorer {
    client: Arc<ServiceClient>,
}

impl HttpFeedbackScorer {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }
}

impl FeedbackScorer for HttpFeedbackScorer {
    fn name(&self) -> &str {
        "ai-service"
    }

    async fn score(&self, request: &FeedbackRequest) -> Result<Feedback, GatewayError> {
        let body = wire::FeedbackRequest {
            transcript: &request.transcript,
            patient_persona: &request.persona,
            session_duration: request.duration_seconds,
            target_profession: request.profession.to_string(),
            difficulty_level: request.difficulty.to_string(),
            scenario_type: &request.scenario_type,
        };
        let resp: wire::FeedbackResponse = self
            .client
            .post_json(Stage::Scoring, "/api/v2/feedback/comprehensive", &body)
            .await?;

        if !resp.overall_score.is_finite() || resp.overall_score < 0.0 {
            return Err(GatewayError::invalid(
                Stage::Scoring,
                format!("overall score out of range: {}", resp.overall_score),
            ));
        }

        Ok(Feedback {
            overall_score: resp.overall_score.round() as u32,
            detailed_scores: resp
                .detailed_scores
                .into_iter()
                .map(|(k, v)| (k, v.max(0.0).round() as u32))
                .collect(),
            strengths: resp.strengths,
            improvements: resp.improvements,
            summary: resp.summary,
            is_default: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedside_types::gateway::PromptMessage;

    #[test]
    fn test_flatten_prompt_labels_roles() {
        let request = GenerationRequest {
            system: "You are a patient.".to_string(),
            messages: vec![
                PromptMessage { role: PromptRole::User, content: "How are you?".to_string() },
                PromptMessage { role: PromptRole::Assistant, content: "Not great.".to_string() },
            ],
            max_tokens: 150,
            temperature: 0.8,
            stop_sequences: vec![],
        };
        let prompt = flatten_prompt(&request);
        assert!(prompt.starts_with("You are a patient."));
        assert!(prompt.contains("Healthcare Professional: How are you?"));
        assert!(prompt.contains("Patient: Not great."));
        assert!(prompt.ends_with("Patient Response:"));
    }

    #[test]
    fn test_finish_confidence() {
        assert!(finish_confidence(Some("stop")) > finish_confidence(Some("length")));
        assert_eq!(finish_confidence(None), 0.75);
    }

    #[test]
    fn test_into_chunks_marks_only_last_final() {
        let data = vec![7u8; TTS_CHUNK_BYTES * 2 + 10];
        let chunks = into_chunks(data, "mp3");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().filter(|c| c.is_final).count(), 1);
        assert!(chunks[2].is_final);
        assert_eq!(chunks[2].data.len(), 10);
    }

    #[test]
    fn test_into_chunks_empty() {
        assert!(into_chunks(Vec::new(), "mp3").is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_failure_surfaces_as_stream_error() {
        use futures_util::StreamExt;

        let client = Arc::new(ServiceClient::new("http://127.0.0.1:9", None).unwrap());
        let synth = HttpSpeechSynthesizer::new(client);
        let mut stream = synth.synthesize(SynthesisRequest {
            text: "hello".to_string(),
            voice: None,
            emotion: None,
        });
        let first = stream.next().await.unwrap();
        assert_eq!(first.unwrap_err().stage(), Stage::Synthesis);
        assert!(stream.next().await.is_none());
    }
}
