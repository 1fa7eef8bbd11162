//! Feedback scoring collaborator, called once at session completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bedside_types::gateway::{Feedback, FeedbackRequest, GatewayError};

pub trait FeedbackScorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(
        &self,
        request: &FeedbackRequest,
    ) -> impl Future<Output = Result<Feedback, GatewayError>> + Send;
}

pub trait FeedbackScorerDyn: Send + Sync {
    fn name(&self) -> &str;

    fn score_boxed<'a>(
        &'a self,
        request: &'a FeedbackRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Feedback, GatewayError>> + Send + 'a>>;
}

impl<T: FeedbackScorer> FeedbackScorerDyn for T {
    fn name(&self) -> &str {
        FeedbackScorer::name(self)
    }

    fn score_boxed<'a>(
        &'a self,
        request: &'a FeedbackRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Feedback, GatewayError>> + Send + 'a>> {
        Box::pin(self.score(request))
    }
}

#[derive(Clone)]
pub struct BoxFeedbackScorer {
    inner: Arc<dyn FeedbackScorerDyn>,
}

impl BoxFeedbackScorer {
    pub fn new<T: FeedbackScorer + 'static>(scorer: T) -> Self {
        Self {
            inner: Arc::new(scorer),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn score(&self, request: &FeedbackRequest) -> Result<Feedback, GatewayError> {
        self.inner.score_boxed(request).await
    }
}

impl std::fmt::Debug for BoxFeedbackScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxFeedbackScorer")
            .field("name", &self.name())
            .finish()
    }
}
