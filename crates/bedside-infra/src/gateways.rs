//! Selects concrete collaborators from configuration.

use std::sync::Arc;

use bedside_core::gateway::{
    BoxFeedbackScorer, BoxReplyGenerator, BoxRoomService, BoxTranscriber, Gateways,
    SpeechSynthesizer,
};
use bedside_types::config::BedsideConfig;

use crate::service::{
    HttpFeedbackScorer, HttpReplyGenerator, HttpRoomService, HttpSpeechSynthesizer, HttpTranscriber,
    ServiceClient,
};
use crate::simulated::{
    HeuristicFeedbackScorer, LocalRoomService, SimulatedReplyGenerator, SimulatedSpeechSynthesizer,
    SimulatedTranscriber,
};

/// Build the collaborator set. The AI service and the room service are
/// chosen independently: each falls back to its offline counterpart when its
/// base URL is not configured.
pub fn build_gateways(config: &BedsideConfig) -> reqwest::Result<Gateways> {
    let services = &config.services;

    let (transcriber, generator, synthesizer, scorer) = match services.ai_base_url.as_deref() {
        Some(url) => {
            let client = ServiceClient::from_env(url, &services.api_key_env)?;
            tracing::info!(url = %client.base_url(), "using AI service");
            (
                BoxTranscriber::new(HttpTranscriber::new(Arc::clone(&client))),
                BoxReplyGenerator::new(HttpReplyGenerator::new(Arc::clone(&client))),
                Arc::new(HttpSpeechSynthesizer::new(Arc::clone(&client))) as Arc<dyn SpeechSynthesizer>,
                BoxFeedbackScorer::new(HttpFeedbackScorer::new(client)),
            )
        }
        None => {
            tracing::info!("no AI service configured, using simulated collaborators");
            (
                BoxTranscriber::new(SimulatedTranscriber),
                BoxReplyGenerator::new(SimulatedReplyGenerator::default()),
                Arc::new(SimulatedSpeechSynthesizer) as Arc<dyn SpeechSynthesizer>,
                BoxFeedbackScorer::new(HeuristicFeedbackScorer),
            )
        }
    };

    let rooms = match services.room_base_url.as_deref() {
        Some(url) => {
            let client = ServiceClient::from_env(url, &services.api_key_env)?;
            tracing::info!(url = %client.base_url(), "using room service");
            BoxRoomService::new(HttpRoomService::new(client))
        }
        None => BoxRoomService::new(LocalRoomService),
    };

    Ok(Gateways {
        transcriber,
        generator,
        synthesizer,
        scorer,
        rooms,
        timeouts: config.timeouts.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_select_offline_collaborators() {
        let gateways = build_gateways(&BedsideConfig::default()).unwrap();
        assert_eq!(gateways.transcriber.name(), "simulated");
        assert_eq!(gateways.generator.name(), "simulated");
        assert_eq!(gateways.synthesizer.name(), "simulated");
        assert_eq!(gateways.scorer.name(), "heuristic");
        assert_eq!(gateways.rooms.name(), "local");
    }

    #[test]
    fn test_services_selected_independently() {
        let mut config = BedsideConfig::default();
        config.services.ai_base_url = Some("http://localhost:8001".to_string());
        let gateways = build_gateways(&config).unwrap();
        assert_eq!(gateways.generator.name(), "ai-service");
        assert_eq!(gateways.scorer.name(), "ai-service");
        assert_eq!(gateways.rooms.name(), "local");
    }
}
