//! Text-to-speech collaborator.
//!
//! Synthesis returns a boxed stream of chunks rather than an RPITIT future,
//! so the trait is object-safe as-is and needs no `Dyn` mirror.

use std::pin::Pin;

use futures_util::Stream;

use bedside_types::gateway::{AudioChunk, GatewayError, SynthesisRequest};

/// Ordered audio chunks for one utterance. The last chunk has `is_final` set.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<AudioChunk, GatewayError>> + Send + 'static>>;

pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    fn synthesize(&self, request: SynthesisRequest) -> AudioStream;
}
