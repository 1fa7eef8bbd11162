//! Collaborator traits and the bundle the orchestrator runs against.
//!
//! Every call goes through [`Gateways::bounded`], which applies the per-stage
//! timeout from configuration. Timeouts surface as `GatewayError::Timeout`
//! and are handled by the caller's fallback branch.

pub mod generation;
pub mod room;
pub mod scoring;
pub mod synthesis;
pub mod transcription;

use std::future::Future;
use std::sync::Arc;

use bedside_types::config::TimeoutConfig;
use bedside_types::gateway::{GatewayError, Stage};

pub use generation::{BoxReplyGenerator, ReplyGenerator};
pub use room::{BoxRoomService, RoomService};
pub use scoring::{BoxFeedbackScorer, FeedbackScorer};
pub use synthesis::{AudioStream, SpeechSynthesizer};
pub use transcription::{BoxTranscriber, Transcriber};

/// All external collaborators for one orchestrator instance.
#[derive(Clone)]
pub struct Gateways {
    pub transcriber: BoxTranscriber,
    pub generator: BoxReplyGenerator,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub scorer: BoxFeedbackScorer,
    pub rooms: BoxRoomService,
    pub timeouts: TimeoutConfig,
}

impl Gateways {
    /// Run a collaborator call under the stage's configured timeout.
    pub async fn bounded<T, F>(&self, stage: Stage, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let limit = self.timeouts.for_stage(stage);
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                stage,
                seconds: limit.as_secs(),
            }),
        }
    }
}

impl std::fmt::Debug for Gateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateways")
            .field("transcriber", &self.transcriber.name())
            .field("generator", &self.generator.name())
            .field("synthesizer", &self.synthesizer.name())
            .field("scorer", &self.scorer.name())
            .field("rooms", &self.rooms.name())
            .finish()
    }
}
