//! Session lifecycle: creation, join, completion, cancellation, fatal failure.
//!
//! Every path that ends a session releases its room reservation exactly once
//! (the registry hands the reservation out a single time).

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use bedside_types::config::SessionConfig;
use bedside_types::error::SessionError;
use bedside_types::gateway::{Feedback, FeedbackRequest, RoomRequest, Stage};
use bedside_types::persona::PersonaSnapshot;
use bedside_types::protocol::ServerEvent;
use bedside_types::scenario::{Difficulty, Profession, ScenarioDefinition, default_scenario_type};
use bedside_types::session::{NewSession, Session, SessionEvent, SessionStatus};

use super::registry::SessionRegistry;
use crate::connection::ConnectionMultiplexer;
use crate::gateway::Gateways;

/// Inputs to session creation. Unset fields come from the scenario catalog.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub scenario_id: String,
    pub profession: Option<Profession>,
    pub difficulty: Option<Difficulty>,
    pub scenario_type: Option<String>,
    pub persona: Option<PersonaSnapshot>,
}

/// What the caller needs to connect to a freshly created session.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub session_id: Uuid,
    pub join_token: String,
    pub room_name: String,
    pub room_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub session: Session,
    pub duration_seconds: u64,
    pub feedback: Feedback,
}

pub struct SessionLifecycle {
    registry: Arc<SessionRegistry>,
    multiplexer: Arc<ConnectionMultiplexer>,
    gateways: Gateways,
    scenarios: Vec<ScenarioDefinition>,
    config: SessionConfig,
}

impl SessionLifecycle {
    pub fn new(
        registry: Arc<SessionRegistry>,
        multiplexer: Arc<ConnectionMultiplexer>,
        gateways: Gateways,
        scenarios: Vec<ScenarioDefinition>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            multiplexer,
            gateways,
            scenarios,
            config,
        }
    }

    pub fn scenarios(&self) -> &[ScenarioDefinition] {
        &self.scenarios
    }

    /// Resolve the persona, provision a room, and register the session.
    pub async fn create(&self, request: CreateSessionRequest) -> Result<SessionTicket, SessionError> {
        let scenario = self.scenarios.iter().find(|s| s.id == request.scenario_id);
        let persona = match (request.persona, scenario) {
            (Some(persona), _) => persona,
            (None, Some(scenario)) => scenario.persona.clone(),
            (None, None) => return Err(SessionError::ScenarioNotFound(request.scenario_id)),
        };

        let id = Uuid::now_v7();
        let room_name = format!("session-{id}");
        let room_request = RoomRequest {
            room_name: room_name.clone(),
            participant: request.user_id.clone(),
            user_id: request.user_id.clone(),
            scenario_id: request.scenario_id.clone(),
        };
        let reservation = self
            .gateways
            .bounded(Stage::Room, self.gateways.rooms.provision(&room_request))
            .await
            .map_err(|e| {
                warn!(session_id = %id, error = %e, "room provisioning failed");
                SessionError::RoomUnavailable(e.to_string())
            })?;

        let params = NewSession {
            user_id: request.user_id,
            scenario_id: request.scenario_id,
            profession: request
                .profession
                .or(scenario.map(|s| s.profession))
                .unwrap_or_default(),
            difficulty: request
                .difficulty
                .or(scenario.map(|s| s.difficulty))
                .unwrap_or_default(),
            scenario_type: request
                .scenario_type
                .or(scenario.map(|s| s.scenario_type.clone()))
                .unwrap_or_else(default_scenario_type),
            persona,
            room_name: reservation.room_name.clone(),
        };
        let ticket = SessionTicket {
            session_id: id,
            join_token: reservation.join_token.clone(),
            room_name: reservation.room_name.clone(),
            room_url: reservation.url.clone(),
        };
        self.registry.create(id, params, reservation);
        Ok(ticket)
    }

    /// Move a `created` session to `active` and announce it.
    pub async fn join(&self, id: Uuid) -> Result<Session, SessionError> {
        let session = self.registry.transition(id, SessionEvent::Join).await?;
        self.multiplexer.send(
            id,
            ServerEvent::SessionStarted {
                started_at: session.started_at.unwrap_or_else(Utc::now),
                room_name: session.room_name.clone(),
            },
        );
        Ok(session)
    }

    /// Score and close an active session.
    ///
    /// Scoring failures substitute the placeholder feedback, so an active
    /// session always completes. The room is released immediately; the
    /// session stays readable for the completion grace period.
    pub async fn complete(&self, id: Uuid, duration: Option<u64>) -> Result<Completion, SessionError> {
        let snapshot = self.registry.get(id).await?;
        if snapshot.status != SessionStatus::Active {
            return Err(SessionError::InvalidTransition {
                id,
                from: snapshot.status,
                event: SessionEvent::Complete,
            });
        }
        let duration_seconds = duration.unwrap_or_else(|| snapshot.elapsed_seconds(Utc::now()));

        let request = FeedbackRequest {
            transcript: snapshot.transcript(),
            persona: snapshot.persona.clone(),
            profession: snapshot.profession,
            difficulty: snapshot.difficulty,
            scenario_type: snapshot.scenario_type.clone(),
            duration_seconds,
        };
        let feedback = match self
            .gateways
            .bounded(Stage::Scoring, self.gateways.scorer.score(&request))
            .await
        {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!(session_id = %id, error = %e, "scoring failed, using placeholder feedback");
                Feedback::placeholder()
            }
        };

        let session = self.registry.transition(id, SessionEvent::Complete).await?;
        self.multiplexer.send(
            id,
            ServerEvent::SessionCompleted {
                duration_seconds,
                feedback: feedback.clone(),
            },
        );
        self.release_room(id).await;
        self.schedule_eviction(id);
        info!(session_id = %id, duration_seconds, score = feedback.overall_score, is_default = feedback.is_default, "session completed");

        Ok(Completion {
            session,
            duration_seconds,
            feedback,
        })
    }

    /// Cancel a `created` or `active` session. No feedback is produced.
    pub async fn cancel(&self, id: Uuid) -> Result<Session, SessionError> {
        let session = self.registry.transition(id, SessionEvent::Cancel).await?;
        self.release_room(id).await;
        self.registry.evict(id);
        self.multiplexer.close_session(id);
        info!(session_id = %id, "session cancelled");
        Ok(session)
    }

    /// Force a session into `error` after an internal invariant violation.
    pub async fn fail(&self, id: Uuid, reason: &str) {
        warn!(session_id = %id, reason, "fatal session error");
        if self.registry.transition(id, SessionEvent::Fatal).await.is_err() {
            return;
        }
        let err = SessionError::Fatal {
            id,
            reason: reason.to_string(),
        };
        self.multiplexer.send(
            id,
            ServerEvent::error(err.code(), "The session ended because of an internal error"),
        );
        self.release_room(id).await;
    }

    /// Release any held room, evict, and close the outbox. Used by the reaper.
    pub async fn expire(&self, id: Uuid) {
        self.release_room(id).await;
        if self.registry.evict(id) {
            self.multiplexer.close_session(id);
            info!(session_id = %id, "expired session reaped");
        }
    }

    async fn release_room(&self, id: Uuid) {
        let Some(room) = self.registry.take_room(id).await else {
            return;
        };
        match self
            .gateways
            .bounded(Stage::Room, self.gateways.rooms.release(&room.room_name))
            .await
        {
            Ok(()) => info!(session_id = %id, room = %room.room_name, "room released"),
            Err(e) => warn!(session_id = %id, room = %room.room_name, error = %e, "room release failed"),
        }
    }

    fn schedule_eviction(&self, id: Uuid) {
        let registry = Arc::clone(&self.registry);
        let multiplexer = Arc::clone(&self.multiplexer);
        let grace = self.config.completion_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            registry.evict(id);
            multiplexer.close_session(id);
        });
    }
}
