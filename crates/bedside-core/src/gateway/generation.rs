//! Text-generation collaborator that voices the patient persona.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bedside_types::gateway::{GatewayError, GeneratedReply, GenerationRequest};

pub trait ReplyGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GeneratedReply, GatewayError>> + Send;
}

pub trait ReplyGeneratorDyn: Send + Sync {
    fn name(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedReply, GatewayError>> + Send + 'a>>;
}

impl<T: ReplyGenerator> ReplyGeneratorDyn for T {
    fn name(&self) -> &str {
        ReplyGenerator::name(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedReply, GatewayError>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }
}

#[derive(Clone)]
pub struct BoxReplyGenerator {
    inner: Arc<dyn ReplyGeneratorDyn>,
}

impl BoxReplyGenerator {
    pub fn new<T: ReplyGenerator + 'static>(generator: T) -> Self {
        Self {
            inner: Arc::new(generator),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedReply, GatewayError> {
        self.inner.generate_boxed(request).await
    }
}

impl std::fmt::Debug for BoxReplyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxReplyGenerator")
            .field("name", &self.name())
            .finish()
    }
}
