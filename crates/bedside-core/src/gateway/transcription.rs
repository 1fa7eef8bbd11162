//! Speech-to-text collaborator.
//!
//! `Transcriber` uses RPITIT, so it cannot be a trait object directly.
//! `TranscriberDyn` is the object-safe mirror with a blanket impl, and
//! `BoxTranscriber` is the cloneable handle the pipeline holds.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bedside_types::gateway::{GatewayError, Transcript, TranscriptionContext};

/// Converts an utterance's audio bytes into text.
///
/// Implementations live in bedside-infra.
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    fn transcribe(
        &self,
        audio: &[u8],
        context: &TranscriptionContext,
    ) -> impl Future<Output = Result<Transcript, GatewayError>> + Send;
}

pub trait TranscriberDyn: Send + Sync {
    fn name(&self) -> &str;

    fn transcribe_boxed<'a>(
        &'a self,
        audio: &'a [u8],
        context: &'a TranscriptionContext,
    ) -> Pin<Box<dyn Future<Output = Result<Transcript, GatewayError>> + Send + 'a>>;
}

impl<T: Transcriber> TranscriberDyn for T {
    fn name(&self) -> &str {
        Transcriber::name(self)
    }

    fn transcribe_boxed<'a>(
        &'a self,
        audio: &'a [u8],
        context: &'a TranscriptionContext,
    ) -> Pin<Box<dyn Future<Output = Result<Transcript, GatewayError>> + Send + 'a>> {
        Box::pin(self.transcribe(audio, context))
    }
}

/// Type-erased transcriber.
#[derive(Clone)]
pub struct BoxTranscriber {
    inner: Arc<dyn TranscriberDyn>,
}

impl BoxTranscriber {
    pub fn new<T: Transcriber + 'static>(transcriber: T) -> Self {
        Self {
            inner: Arc::new(transcriber),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn transcribe(
        &self,
        audio: &[u8],
        context: &TranscriptionContext,
    ) -> Result<Transcript, GatewayError> {
        self.inner.transcribe_boxed(audio, context).await
    }
}

impl std::fmt::Debug for BoxTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTranscriber")
            .field("name", &self.name())
            .finish()
    }
}
