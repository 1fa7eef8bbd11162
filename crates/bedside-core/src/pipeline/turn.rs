//! The turn pipeline: transcription, persona reply, then synthesis.
//!
//! Gateway failures never abort a turn. A failed transcription records a
//! placeholder user turn and continues with an empty utterance; a failed
//! generation substitutes a canned reply; a failed synthesis leaves the turn
//! text-only. The reply text is always sent before any audio.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use bedside_types::error::SessionError;
use bedside_types::gateway::{
    AudioChunk, GatewayError, GeneratedReply, Stage, SynthesisRequest, TranscriptionContext,
};
use bedside_types::protocol::{AudioQuality, ServerEvent};
use bedside_types::session::{NewTurn, Session, Speaker, Turn};

use crate::connection::ConnectionMultiplexer;
use crate::gateway::{AudioStream, Gateways};
use crate::prompt::{FALLBACK_CONFIDENCE, PersonaPromptBuilder, fallback_reply};
use crate::session::SessionRegistry;

/// Text recorded for a user turn whose audio could not be transcribed.
pub const UNTRANSCRIBED: &str = "[unable to transcribe]";

/// One unit of work for a session's turn queue.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnJob {
    /// The persona's opening line.
    Greeting,
    Audio { audio: Vec<u8>, hint: Option<String> },
    Text { text: String },
}

impl TurnJob {
    pub fn kind(&self) -> &'static str {
        match self {
            TurnJob::Greeting => "greeting",
            TurnJob::Audio { .. } => "audio",
            TurnJob::Text { .. } => "text",
        }
    }
}

pub struct TurnPipeline {
    registry: Arc<SessionRegistry>,
    multiplexer: Arc<ConnectionMultiplexer>,
    gateways: Gateways,
    prompts: PersonaPromptBuilder,
    language: String,
    default_voice: Option<String>,
}

impl TurnPipeline {
    pub fn new(
        registry: Arc<SessionRegistry>,
        multiplexer: Arc<ConnectionMultiplexer>,
        gateways: Gateways,
        prompts: PersonaPromptBuilder,
        language: String,
        default_voice: Option<String>,
    ) -> Self {
        Self {
            registry,
            multiplexer,
            gateways,
            prompts,
            language,
            default_voice,
        }
    }

    /// Execute one turn for `session_id`.
    ///
    /// Claims the session's in-flight slot for the whole execution; a
    /// concurrent claim is reported as `Fatal`. The turn is abandoned when
    /// `cancel` fires. A session that ends mid-turn is not an error.
    pub async fn execute(
        &self,
        session_id: Uuid,
        job: TurnJob,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let _guard = self.registry.begin_turn(session_id)?;
        let kind = job.kind();
        debug!(%session_id, kind, "turn started");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%session_id, kind, "turn abandoned, session ended");
                Ok(())
            }
            result = self.run(session_id, job) => result,
        };

        match result {
            Err(SessionError::NotActive { .. }) | Err(SessionError::NotFound(_)) => {
                debug!(%session_id, kind, "session closed during turn");
                Ok(())
            }
            other => other,
        }
    }

    async fn run(&self, id: Uuid, job: TurnJob) -> Result<(), SessionError> {
        match job {
            TurnJob::Greeting => self.greet(id).await,
            TurnJob::Audio { audio, hint } => {
                let utterance = self.transcribe(id, &audio, hint).await?;
                self.respond(id, &utterance).await
            }
            TurnJob::Text { text } => {
                let turn = self.registry.append_turn(id, NewTurn::user(&text, 1.0)).await?;
                self.multiplexer.send(
                    id,
                    ServerEvent::Transcription {
                        text: text.clone(),
                        confidence: 1.0,
                        turn: turn.sequence,
                    },
                );
                self.respond(id, &text).await
            }
        }
    }

    async fn greet(&self, id: Uuid) -> Result<(), SessionError> {
        let session = self.registry.get(id).await?;
        let text = self.prompts.greeting(&session.persona);
        let emotion = Some(session.persona.emotion().to_string());
        let turn = self
            .registry
            .append_turn(id, NewTurn::ai(text, 1.0, emotion))
            .await?;
        self.multiplexer.send(
            id,
            ServerEvent::AiGreeting {
                text: turn.text.clone(),
                emotion: turn.emotion.clone(),
                turn: turn.sequence,
            },
        );
        self.speak(id, &session, &turn).await;
        Ok(())
    }

    /// Returns the recognised text, or an empty string when transcription failed.
    async fn transcribe(
        &self,
        id: Uuid,
        audio: &[u8],
        hint: Option<String>,
    ) -> Result<String, SessionError> {
        let session = self.registry.get(id).await?;
        let context = TranscriptionContext {
            profession: session.profession,
            language: Some(self.language.clone()),
            hint,
        };
        let outcome = self
            .gateways
            .bounded(
                Stage::Transcription,
                self.gateways.transcriber.transcribe(audio, &context),
            )
            .await
            .and_then(|t| {
                if t.text.trim().is_empty() {
                    Err(GatewayError::invalid(Stage::Transcription, "empty transcript"))
                } else {
                    Ok(t)
                }
            });

        match outcome {
            Ok(transcript) => {
                let text = transcript.text.trim().to_string();
                let turn = self
                    .registry
                    .append_turn(id, NewTurn::user(&text, transcript.confidence))
                    .await?;
                self.multiplexer.send(
                    id,
                    ServerEvent::Transcription {
                        text: text.clone(),
                        confidence: transcript.confidence,
                        turn: turn.sequence,
                    },
                );
                self.multiplexer.send(
                    id,
                    ServerEvent::AudioQuality {
                        confidence: transcript.confidence,
                        level: AudioQuality::from_confidence(transcript.confidence),
                        bytes: audio.len(),
                    },
                );
                Ok(text)
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "transcription failed, continuing with empty utterance");
                self.registry
                    .append_turn(id, NewTurn::user(UNTRANSCRIBED, 0.0))
                    .await?;
                self.multiplexer.send(
                    id,
                    ServerEvent::error(
                        "TRANSCRIPTION_FAILED",
                        "Sorry, that audio could not be understood. Please try again.",
                    ),
                );
                Ok(String::new())
            }
        }
    }

    async fn respond(&self, id: Uuid, utterance: &str) -> Result<(), SessionError> {
        let session = self.registry.get(id).await?;
        let history = match session.turns.split_last() {
            Some((last, earlier)) if last.speaker == Speaker::User => earlier,
            _ => &session.turns[..],
        };
        let request = self.prompts.build(&session, history, utterance);

        let generated = self
            .gateways
            .bounded(Stage::Generation, self.gateways.generator.generate(&request))
            .await
            .and_then(|r| {
                if r.text.trim().is_empty() {
                    Err(GatewayError::invalid(Stage::Generation, "empty reply"))
                } else {
                    Ok(r)
                }
            });
        let (reply, fallback) = match generated {
            Ok(reply) => (reply, false),
            Err(e) => {
                warn!(session_id = %id, error = %e, "generation failed, using fallback reply");
                let reply = GeneratedReply {
                    text: fallback_reply(session.profession).to_string(),
                    confidence: FALLBACK_CONFIDENCE,
                    emotion: None,
                };
                (reply, true)
            }
        };

        let emotion = reply
            .emotion
            .or_else(|| Some(session.persona.emotion().to_string()));
        let turn = self
            .registry
            .append_turn(id, NewTurn::ai(reply.text.trim(), reply.confidence, emotion))
            .await?;
        self.multiplexer.send(
            id,
            ServerEvent::AiResponse {
                text: turn.text.clone(),
                confidence: reply.confidence,
                emotion: turn.emotion.clone(),
                turn: turn.sequence,
                fallback,
            },
        );
        self.speak(id, &session, &turn).await;
        Ok(())
    }

    /// Synthesize and emit audio for an ai turn. All chunks are gathered
    /// before any is sent, so a failure leaves the turn without audio rather
    /// than with a truncated clip.
    async fn speak(&self, id: Uuid, session: &Session, turn: &Turn) {
        let request = SynthesisRequest {
            text: turn.text.clone(),
            voice: session
                .persona
                .voice
                .clone()
                .or_else(|| self.default_voice.clone()),
            emotion: turn.emotion.clone(),
        };
        let stream = self.gateways.synthesizer.synthesize(request);
        let chunks = match self
            .gateways
            .bounded(Stage::Synthesis, collect_chunks(stream))
            .await
        {
            Ok(chunks) if !chunks.is_empty() => chunks,
            Ok(_) => {
                debug!(session_id = %id, turn = turn.sequence, "synthesis produced no audio");
                return;
            }
            Err(e) => {
                warn!(session_id = %id, turn = turn.sequence, error = %e, "synthesis failed, text-only turn");
                return;
            }
        };

        let last = chunks.len() - 1;
        for (position, chunk) in chunks.into_iter().enumerate() {
            self.multiplexer.send(
                id,
                ServerEvent::TtsChunk {
                    audio: BASE64.encode(&chunk.data),
                    format: chunk.format,
                    sequence: position as u32,
                    is_final: position == last,
                    turn: turn.sequence,
                },
            );
        }
    }
}

async fn collect_chunks(stream: AudioStream) -> Result<Vec<AudioChunk>, GatewayError> {
    stream.try_collect().await
}
