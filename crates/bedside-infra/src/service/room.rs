//! Media room service client.

use std::sync::Arc;

use bedside_core::gateway::RoomService;
use bedside_types::gateway::{GatewayError, RoomRequest, RoomReservation, Stage};

use super::ServiceClient;
use super::wire;

pub struct HttpRoomService {
    client: Arc<ServiceClient>,
}

impl HttpRoomService {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }
}

impl RoomService for HttpRoomService {
    fn name(&self) -> &str {
        "room-service"
    }

    async fn provision(&self, request: &RoomRequest) -> Result<RoomReservation, GatewayError> {
        let body = wire::TokenRequest {
            room_name: &request.room_name,
            participant_name: &request.participant,
            user_id: &request.user_id,
            metadata: serde_json::json!({ "scenarioId": request.scenario_id }),
        };
        let resp: wire::TokenResponse = self.client.post_json(Stage::Room, "/api/token", &body).await?;
        if resp.token.is_empty() {
            return Err(GatewayError::invalid(Stage::Room, "empty join token"));
        }

        tracing::info!(room = %request.room_name, "room provisioned");
        Ok(RoomReservation {
            room_name: request.room_name.clone(),
            join_token: resp.token,
            url: resp.url,
        })
    }

    async fn release(&self, room_name: &str) -> Result<(), GatewayError> {
        self.client
            .delete(Stage::Room, &format!("/api/rooms/{room_name}"))
            .await?;
        tracing::info!(room = %room_name, "room released");
        Ok(())
    }
}
