//! Scriptable collaborators and a harness for orchestrator tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use uuid::Uuid;

use bedside_types::config::BedsideConfig;
use bedside_types::gateway::{
    AudioChunk, Feedback, FeedbackRequest, GatewayError, GeneratedReply, GenerationRequest,
    RoomRequest, RoomReservation, Stage, SynthesisRequest, Transcript, TranscriptionContext,
};
use bedside_types::persona::PersonaSnapshot;
use bedside_types::protocol::Envelope;
use bedside_types::scenario::{Difficulty, Profession, ScenarioDefinition};

use crate::connection::Outbound;
use crate::gateway::{
    AudioStream, BoxFeedbackScorer, BoxReplyGenerator, BoxRoomService, BoxTranscriber,
    FeedbackScorer, Gateways, ReplyGenerator, RoomService, SpeechSynthesizer, Transcriber,
};
use crate::orchestrator::SessionOrchestrator;
use crate::pipeline::{TurnPipeline, TurnQueue};
use crate::session::{CreateSessionRequest, SessionTicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Never resolves; the stage timeout fires instead.
    Hang,
    Panic,
}

async fn act<T>(behavior: Behavior, stage: Stage, value: T) -> Result<T, GatewayError> {
    match behavior {
        Behavior::Succeed => Ok(value),
        Behavior::Fail => Err(GatewayError::failure(stage, "scripted failure")),
        Behavior::Hang => std::future::pending().await,
        Behavior::Panic => panic!("scripted panic in {stage}"),
    }
}

struct MockTranscriber {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl Transcriber for MockTranscriber {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(
        &self,
        _audio: &[u8],
        context: &TranscriptionContext,
    ) -> Result<Transcript, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = context.hint.clone().unwrap_or_else(|| "Hello".to_string());
        act(self.behavior, Stage::Transcription, Transcript { text, confidence: 0.92 }).await
    }
}

struct MockGenerator {
    behavior: Behavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ReplyGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let heard = request.last_user_message().unwrap_or_default().len();
        let reply = GeneratedReply {
            text: format!("It started a few days ago. ({heard})"),
            confidence: 0.85,
            emotion: Some("concerned".to_string()),
        };
        act(self.behavior, Stage::Generation, reply).await
    }
}

struct MockSynthesizer {
    behavior: Behavior,
    chunks: usize,
}

impl SpeechSynthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock"
    }

    fn synthesize(&self, _request: SynthesisRequest) -> AudioStream {
        if self.behavior != Behavior::Succeed {
            return Box::pin(stream::iter(vec![Err(GatewayError::failure(
                Stage::Synthesis,
                "scripted failure",
            ))]));
        }
        let total = self.chunks;
        let items: Vec<Result<AudioChunk, GatewayError>> = (0..total)
            .map(|i| {
                Ok(AudioChunk {
                    data: vec![i as u8; 8],
                    format: "pcm_s16le".to_string(),
                    is_final: i + 1 == total,
                })
            })
            .collect();
        Box::pin(stream::iter(items))
    }
}

struct MockScorer {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl FeedbackScorer for MockScorer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn score(&self, _request: &FeedbackRequest) -> Result<Feedback, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let feedback = Feedback {
            overall_score: 410,
            is_default: false,
            summary: Some("Solid history taking".to_string()),
            ..Feedback::placeholder()
        };
        act(self.behavior, Stage::Scoring, feedback).await
    }
}

struct MockRooms {
    behavior: Behavior,
    released: Arc<Mutex<Vec<String>>>,
}

impl RoomService for MockRooms {
    fn name(&self) -> &str {
        "mock"
    }

    async fn provision(&self, request: &RoomRequest) -> Result<RoomReservation, GatewayError> {
        let reservation = RoomReservation {
            room_name: request.room_name.clone(),
            join_token: format!("token-{}", request.room_name),
            url: Some("wss://rooms.test".to_string()),
        };
        act(self.behavior, Stage::Room, reservation).await
    }

    async fn release(&self, room_name: &str) -> Result<(), GatewayError> {
        self.released.lock().unwrap().push(room_name.to_string());
        Ok(())
    }
}

/// Per-stage scripted behavior.
#[derive(Debug, Clone)]
pub struct MockGateways {
    pub transcription: Behavior,
    pub generation: Behavior,
    pub synthesis: Behavior,
    pub scoring: Behavior,
    pub rooms: Behavior,
    pub generation_delay: Duration,
    pub chunks: usize,
}

impl Default for MockGateways {
    fn default() -> Self {
        Self {
            transcription: Behavior::Succeed,
            generation: Behavior::Succeed,
            synthesis: Behavior::Succeed,
            scoring: Behavior::Succeed,
            rooms: Behavior::Succeed,
            generation_delay: Duration::ZERO,
            chunks: 3,
        }
    }
}

/// Call counters and recorded side effects of the mock gateways.
#[derive(Clone, Default)]
pub struct Probes {
    transcriptions: Arc<AtomicUsize>,
    generations: Arc<AtomicUsize>,
    scorings: Arc<AtomicUsize>,
    released: Arc<Mutex<Vec<String>>>,
}

impl Probes {
    pub fn transcriptions(&self) -> usize {
        self.transcriptions.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn scorings(&self) -> usize {
        self.scorings.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

impl MockGateways {
    pub fn build(&self, config: &BedsideConfig) -> (Gateways, Probes) {
        let probes = Probes::default();
        let gateways = Gateways {
            transcriber: BoxTranscriber::new(MockTranscriber {
                behavior: self.transcription,
                calls: Arc::clone(&probes.transcriptions),
            }),
            generator: BoxReplyGenerator::new(MockGenerator {
                behavior: self.generation,
                delay: self.generation_delay,
                calls: Arc::clone(&probes.generations),
            }),
            synthesizer: Arc::new(MockSynthesizer {
                behavior: self.synthesis,
                chunks: self.chunks,
            }),
            scorer: BoxFeedbackScorer::new(MockScorer {
                behavior: self.scoring,
                calls: Arc::clone(&probes.scorings),
            }),
            rooms: BoxRoomService::new(MockRooms {
                behavior: self.rooms,
                released: Arc::clone(&probes.released),
            }),
            timeouts: config.timeouts.clone(),
        };
        (gateways, probes)
    }
}

pub fn test_config() -> BedsideConfig {
    BedsideConfig {
        scenarios: vec![ScenarioDefinition {
            id: "headache".to_string(),
            title: "Persistent headaches".to_string(),
            description: String::new(),
            profession: Profession::Doctor,
            difficulty: Difficulty::Intermediate,
            scenario_type: "consultation".to_string(),
            persona: PersonaSnapshot::default(),
        }],
        ..BedsideConfig::default()
    }
}

pub struct Harness {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub probes: Probes,
}

pub fn harness(mocks: MockGateways) -> Harness {
    let config = test_config();
    let (gateways, probes) = mocks.build(&config);
    Harness {
        orchestrator: Arc::new(SessionOrchestrator::new(config, gateways)),
        probes,
    }
}

impl Harness {
    pub async fn create_session(&self) -> SessionTicket {
        self.orchestrator
            .create_session(CreateSessionRequest {
                user_id: "learner-1".to_string(),
                scenario_id: "headache".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn connect(&self, ticket: &SessionTicket) -> (Uuid, Outbound) {
        self.orchestrator
            .connect(ticket.session_id, &ticket.join_token, None)
            .await
            .unwrap()
    }

    pub fn pipeline(&self) -> &Arc<TurnPipeline> {
        self.orchestrator.pipeline()
    }

    pub fn queue(&self) -> &TurnQueue {
        self.orchestrator.queue()
    }
}

/// Envelope kind, with final tts chunks labelled `tts_chunk(final)`.
pub fn label(envelope: &Envelope) -> String {
    if envelope.kind == "tts_chunk" && envelope.data["final"] == true {
        "tts_chunk(final)".to_string()
    } else {
        envelope.kind.clone()
    }
}

async fn collect(
    rx: &mut Outbound,
    name: fn(&Envelope) -> String,
    mut stop: impl FnMut(&str) -> bool,
) -> Vec<String> {
    let mut seen = Vec::new();
    while let Ok(Some(envelope)) = tokio::time::timeout(Duration::from_secs(120), rx.recv()).await {
        let n = name(&envelope);
        let done = stop(&n);
        seen.push(n);
        if done {
            break;
        }
    }
    seen
}

/// Receive envelope kinds until `stop` matches one or the channel goes quiet.
pub async fn collect_kinds(rx: &mut Outbound, stop: impl FnMut(&str) -> bool) -> Vec<String> {
    collect(rx, |e| e.kind.clone(), stop).await
}

/// Like [`collect_kinds`] but distinguishes the final tts chunk.
pub async fn collect_labels(rx: &mut Outbound, stop: impl FnMut(&str) -> bool) -> Vec<String> {
    collect(rx, label, stop).await
}
