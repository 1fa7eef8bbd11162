//! HTTP clients for the external collaborators.
//!
//! [`ServiceClient`] owns the shared `reqwest::Client`, base URL and API key.
//! The per-collaborator types in [`ai`] and [`room`] translate between the
//! gateway payloads and each service's JSON shapes.

pub mod ai;
pub mod room;
mod wire;

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

use bedside_types::gateway::{GatewayError, Stage};

pub use ai::{HttpFeedbackScorer, HttpReplyGenerator, HttpSpeechSynthesizer, HttpTranscriber};
pub use room::HttpRoomService;

/// Upper bound on any single request. Per-stage timeouts from configuration
/// are applied by the orchestrator and are normally much shorter.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared HTTP plumbing for one collaborator base URL.
///
/// The API key is a [`SecretString`] and is only exposed when building the
/// `Authorization` header. `ServiceClient` does not implement `Debug`.
pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build a client whose API key is read from the named environment
    /// variable. A missing or empty variable means unauthenticated requests.
    pub fn from_env(base_url: impl Into<String>, api_key_env: &str) -> reqwest::Result<Arc<Self>> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        if api_key.is_none() {
            tracing::debug!(env = api_key_env, "no collaborator API key set");
        }
        Self::new(base_url, api_key).map(Arc::new)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<B, R>(&self, stage: Stage, path: &str, body: &B) -> Result<R, GatewayError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(stage = %stage, url = %url, "collaborator request");

        let response = self
            .authorize(self.client.post(&url).json(body))
            .send()
            .await
            .map_err(|e| GatewayError::failure(stage, format!("HTTP request failed: {e}")))?;

        let response = check_status(stage, response).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| GatewayError::invalid(stage, format!("failed to parse response: {e}")))
    }

    /// DELETE a resource, ignoring any response body. A 404 counts as success.
    pub async fn delete(&self, stage: Stage, path: &str) -> Result<(), GatewayError> {
        let url = self.url(path);
        let response = self
            .authorize(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| GatewayError::failure(stage, format!("HTTP request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(stage, response).await.map(|_| ())
    }
}

async fn check_status(stage: Stage, response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::failure(stage, format!("HTTP {status}: {}", truncate(&body, 200))))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ServiceClient::new("http://localhost:8001/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8001");
        assert_eq!(client.url("/api/v1/tts"), "http://localhost:8001/api/v1/tts");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_failure() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let client = ServiceClient::new("http://127.0.0.1:9", None).unwrap();
        let result: Result<serde_json::Value, _> = client
            .post_json(Stage::Scoring, "/api/v2/feedback/comprehensive", &serde_json::json!({}))
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.stage(), Stage::Scoring);
        assert!(matches!(err, GatewayError::Failure { .. }));
    }
}
