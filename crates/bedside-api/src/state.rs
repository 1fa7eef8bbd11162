//! Application state shared by all HTTP and WebSocket handlers.

use std::sync::Arc;

use bedside_core::SessionOrchestrator;
use bedside_core::gateway::Gateways;
use bedside_infra::build_gateways;
use bedside_types::config::BedsideConfig;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    /// Wire collaborators from configuration.
    pub fn init(config: BedsideConfig) -> anyhow::Result<Self> {
        let gateways = build_gateways(&config)?;
        tracing::debug!(?gateways, "collaborators selected");
        Ok(Self::with_gateways(config, gateways))
    }

    pub fn with_gateways(config: BedsideConfig, gateways: Gateways) -> Self {
        Self {
            orchestrator: Arc::new(SessionOrchestrator::new(config, gateways)),
        }
    }

    pub fn config(&self) -> &BedsideConfig {
        self.orchestrator.config()
    }
}
