//! Offline collaborators for local development.
//!
//! Used when no service URLs are configured. Transcription trusts the
//! client-side hint, replies come from a small keyword script, speech is
//! silence, and scoring uses a keyword heuristic over the transcript.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::stream;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use bedside_core::gateway::{AudioStream, FeedbackScorer, ReplyGenerator, RoomService, SpeechSynthesizer, Transcriber};
use bedside_types::gateway::{
    AudioChunk, Feedback, FeedbackRequest, GatewayError, GeneratedReply, GenerationRequest,
    RoomRequest, RoomReservation, Stage, SynthesisRequest, Transcript, TranscriptionContext,
};

/// 100ms of 16kHz mono s16le.
const SILENT_CHUNK_BYTES: usize = 3_200;
const WORDS_PER_CHUNK: usize = 8;

const CLINICAL_KEYWORDS: [&str; 6] = [
    "symptoms",
    "treatment",
    "medication",
    "diagnosis",
    "pain",
    "examination",
];

#[derive(Debug, Default)]
pub struct SimulatedTranscriber;

impl Transcriber for SimulatedTranscriber {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        context: &TranscriptionContext,
    ) -> Result<Transcript, GatewayError> {
        match context.hint.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() => Ok(Transcript {
                text: hint.to_string(),
                confidence: 0.9,
            }),
            _ => Err(GatewayError::failure(
                Stage::Transcription,
                format!("no transcript hint for {} bytes of audio", audio.len()),
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedReplyGenerator {
    /// Artificial latency, so clients see realistic pacing.
    pub delay: Option<Duration>,
}

/// Pull `- {label}: value` out of the persona profile block.
fn profile_field<'a>(system: &'a str, label: &str) -> Option<&'a str> {
    let prefix = format!("- {label}: ");
    system
        .lines()
        .find_map(|line| line.trim_start().strip_prefix(prefix.as_str()))
        .map(str::trim)
}

/// The clinician's words are the quoted text in the final user message.
fn quoted_utterance(message: &str) -> Option<&str> {
    let start = message.find('"')? + 1;
    let end = message.rfind('"')?;
    (end > start).then(|| &message[start..end])
}

fn scripted_reply(system: &str, utterance: Option<&str>) -> String {
    let condition = profile_field(system, "Primary Condition").unwrap_or("this problem");
    let symptoms = profile_field(system, "Current Symptoms").unwrap_or("feeling unwell");

    let Some(utterance) = utterance else {
        return "Sorry, I didn't catch that. Could you say it again?".to_string();
    };
    let lower = utterance.to_lowercase();

    if lower.contains("pain") || lower.contains("hurt") {
        format!("It's hard to describe. Mostly it's {symptoms}, and it gets worse later in the day.")
    } else if lower.contains("how long") || lower.contains("when did") || lower.contains("started") {
        format!("It started about two weeks ago. The {condition} has been getting harder to ignore.")
    } else if lower.contains("medication") || lower.contains("medicine") || lower.contains("taking") {
        "Just paracetamol now and then. I'm not on anything regular.".to_string()
    } else if lower.contains("allerg") {
        "Not that I know of.".to_string()
    } else if lower.contains("worr") || lower.contains("concern") || lower.contains("feel") {
        format!("Honestly, I'm a bit scared. I keep thinking the {condition} could be something serious.")
    } else if lower.ends_with('?') {
        format!("I'm not really sure. All I know is I've had {symptoms}.")
    } else {
        "Okay, thank you. What do you think I should do next?".to_string()
    }
}

impl ReplyGenerator for SimulatedReplyGenerator {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let utterance = request.last_user_message().and_then(quoted_utterance);
        Ok(GeneratedReply {
            text: scripted_reply(&request.system, utterance),
            confidence: 0.85,
            emotion: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct SimulatedSpeechSynthesizer;

impl SpeechSynthesizer for SimulatedSpeechSynthesizer {
    fn name(&self) -> &str {
        "simulated"
    }

    fn synthesize(&self, request: SynthesisRequest) -> AudioStream {
        let words = request.text.split_whitespace().count();
        let count = words.div_ceil(WORDS_PER_CHUNK).max(1);
        let chunks = (0..count).map(move |i| {
            Ok(AudioChunk {
                data: vec![0u8; SILENT_CHUNK_BYTES],
                format: "pcm_s16le".to_string(),
                is_final: i + 1 == count,
            })
        });
        Box::pin(stream::iter(chunks))
    }
}

#[derive(Debug, Default)]
pub struct HeuristicFeedbackScorer;

/// Keyword and length scoring across the four assessment categories.
///
/// Each category starts at 75 and is capped at 125, so the overall score
/// falls between 300 and 500.
pub fn heuristic_feedback(transcript: &str) -> Feedback {
    let words: Vec<String> = transcript
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| c.is_ascii_punctuation())
                .to_lowercase()
        })
        .collect();
    let word_count = words.len() as u32;
    let keyword_count = words
        .iter()
        .filter(|w| CLINICAL_KEYWORDS.contains(&w.as_str()))
        .count() as u32;

    let communication = (75 + keyword_count * 5).min(125);
    let language = (75 + word_count / 10).min(125);
    let clinical = (75 + keyword_count * 8).min(125);
    let professional = 100;

    let detailed_scores: BTreeMap<String, u32> = [
        ("communication", communication),
        ("language", language),
        ("clinical_knowledge", clinical),
        ("professional_interaction", professional),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut improvements = Vec::new();
    if keyword_count < 3 {
        improvements.push("Explore symptoms and treatment options in more depth".to_string());
    }
    if word_count < 100 {
        improvements.push("Extend the consultation with more open questions".to_string());
    }
    improvements.push("Practice active listening techniques".to_string());

    let mut strengths = vec!["Appropriate professional demeanor".to_string()];
    if keyword_count >= 3 {
        strengths.push("Good use of medical terminology".to_string());
    }
    if word_count >= 100 {
        strengths.push("Sustained, detailed conversation".to_string());
    }

    Feedback {
        overall_score: communication + language + clinical + professional,
        detailed_scores,
        strengths,
        improvements,
        summary: Some(format!(
            "{word_count} words with {keyword_count} clinical terms."
        )),
        is_default: false,
    }
}

impl FeedbackScorer for HeuristicFeedbackScorer {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn score(&self, request: &FeedbackRequest) -> Result<Feedback, GatewayError> {
        Ok(heuristic_feedback(&request.transcript))
    }
}

/// Issues locally generated join tokens. No media is actually routed.
#[derive(Debug, Default)]
pub struct LocalRoomService;

fn local_token(request: &RoomRequest) -> String {
    let nonce = Uuid::now_v7();
    let material = format!(
        "{}:{}:{}:{nonce}",
        request.room_name, request.user_id, request.participant
    );
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

impl RoomService for LocalRoomService {
    fn name(&self) -> &str {
        "local"
    }

    async fn provision(&self, request: &RoomRequest) -> Result<RoomReservation, GatewayError> {
        Ok(RoomReservation {
            room_name: request.room_name.clone(),
            join_token: local_token(request),
            url: None,
        })
    }

    async fn release(&self, room_name: &str) -> Result<(), GatewayError> {
        tracing::debug!(room = %room_name, "local room released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedside_core::prompt::PersonaPromptBuilder;
    use bedside_types::persona::PersonaSnapshot;
    use bedside_types::session::{NewSession, Session};
    use futures_util::StreamExt;

    fn session() -> Session {
        Session::new(
            Uuid::now_v7(),
            NewSession {
                user_id: "u-1".to_string(),
                scenario_id: "headache".to_string(),
                profession: Default::default(),
                difficulty: Default::default(),
                scenario_type: "consultation".to_string(),
                persona: PersonaSnapshot::default(),
                room_name: "session-1".to_string(),
            },
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_transcriber_uses_hint() {
        let ctx = TranscriptionContext {
            hint: Some("  Where does it hurt?  ".to_string()),
            ..Default::default()
        };
        let t = SimulatedTranscriber.transcribe(b"pcm", &ctx).await.unwrap();
        assert_eq!(t.text, "Where does it hurt?");
    }

    #[tokio::test]
    async fn test_transcriber_without_hint_fails() {
        let err = SimulatedTranscriber
            .transcribe(b"pcm", &TranscriptionContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Transcription);
    }

    #[tokio::test]
    async fn test_scripted_reply_reads_persona_profile() {
        let builder = PersonaPromptBuilder::new(None);
        let request = builder.build(&session(), &[], "How long has this been going on?");
        let reply = SimulatedReplyGenerator::default()
            .generate(&request)
            .await
            .unwrap();
        assert!(reply.text.contains("persistent headaches"), "{}", reply.text);
    }

    #[tokio::test]
    async fn test_scripted_reply_for_inaudible_utterance() {
        let builder = PersonaPromptBuilder::new(None);
        let request = builder.build(&session(), &[], "");
        let reply = SimulatedReplyGenerator::default()
            .generate(&request)
            .await
            .unwrap();
        assert!(!reply.text.is_empty());
    }

    #[test]
    fn test_quoted_utterance() {
        assert_eq!(
            quoted_utterance("Healthcare Professional just said: \"Any pain?\"\n\nRespond..."),
            Some("Any pain?")
        );
        assert_eq!(quoted_utterance("no quotes"), None);
    }

    #[tokio::test]
    async fn test_silent_synthesis_chunks() {
        let chunks: Vec<_> = SimulatedSpeechSynthesizer
            .synthesize(SynthesisRequest {
                text: "one two three four five six seven eight nine".to_string(),
                voice: None,
                emotion: None,
            })
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        let last = chunks.last().unwrap().as_ref().unwrap();
        assert!(last.is_final);
        assert!(!chunks[0].as_ref().unwrap().is_final);
    }

    #[test]
    fn test_heuristic_feedback_baseline() {
        let fb = heuristic_feedback("Hello there");
        assert_eq!(fb.detailed_scores["communication"], 75);
        assert_eq!(fb.detailed_scores["professional_interaction"], 100);
        assert_eq!(fb.overall_score, 75 + 75 + 75 + 100);
        assert!(!fb.is_default);
    }

    #[test]
    fn test_heuristic_feedback_counts_keywords() {
        let fb = heuristic_feedback("Doctor: Any pain? Let's discuss symptoms, treatment and medication.");
        assert_eq!(fb.detailed_scores["communication"], 75 + 4 * 5);
        assert_eq!(fb.detailed_scores["clinical_knowledge"], 75 + 4 * 8);
        assert!(fb.strengths.iter().any(|s| s.contains("terminology")));
    }

    #[test]
    fn test_heuristic_feedback_caps_at_125() {
        let transcript = "pain ".repeat(40);
        let fb = heuristic_feedback(&transcript);
        assert_eq!(fb.detailed_scores["clinical_knowledge"], 125);
        assert!(fb.overall_score <= 500);
    }

    #[tokio::test]
    async fn test_local_room_tokens_are_unique() {
        let request = RoomRequest {
            room_name: "session-1".to_string(),
            participant: "learner".to_string(),
            user_id: "u-1".to_string(),
            scenario_id: "headache".to_string(),
        };
        let a = LocalRoomService.provision(&request).await.unwrap();
        let b = LocalRoomService.provision(&request).await.unwrap();
        assert_eq!(a.join_token.len(), 64);
        assert_ne!(a.join_token, b.join_token);
        assert!(LocalRoomService.release("session-1").await.is_ok());
    }
}
