//! Session HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/sessions               - Create a session and reserve a room
//! - GET  /api/v1/sessions/{id}          - Session snapshot with turn history
//! - POST /api/v1/sessions/{id}/complete - End the session and score it
//! - POST /api/v1/sessions/{id}/cancel   - Abandon the session
//!
//! All routes require `X-User-ID`; a session is only visible to its owner.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bedside_core::session::CreateSessionRequest;
use bedside_types::error::SessionError;
use bedside_types::gateway::Feedback;
use bedside_types::persona::PersonaSnapshot;
use bedside_types::scenario::{Difficulty, Profession};
use bedside_types::session::{Session, SessionStatus};

use crate::http::error::AppError;
use crate::http::extractors::user::CurrentUser;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    pub scenario_id: String,
    #[serde(default)]
    pub profession: Option<Profession>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub scenario_type: Option<String>,
    #[serde(default)]
    pub persona: Option<PersonaSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub join_token: String,
    pub room_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_url: Option<String>,
    pub websocket_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBody {
    /// Client-measured duration in seconds.
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub status: SessionStatus,
    pub duration_seconds: u64,
    pub feedback: Feedback,
}

#[derive(Debug, Serialize)]
pub struct StatusOnly {
    pub status: SessionStatus,
}

fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// Load a session the caller owns. Someone else's session looks missing.
async fn owned_session(state: &AppState, id: Uuid, user: &CurrentUser) -> Result<Session, AppError> {
    let session = state.orchestrator.registry().get(id).await?;
    if session.user_id != user.0 {
        tracing::debug!(session_id = %id, "session requested by non-owner");
        return Err(SessionError::NotFound(id).into());
    }
    Ok(session)
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<ApiResponse<CreatedSession>>, AppError> {
    let clock = RequestClock::start();

    let scenario_id = body.scenario_id.trim().to_string();
    if scenario_id.is_empty() {
        return Err(AppError::Validation("scenarioId is required".to_string()));
    }

    let ticket = state
        .orchestrator
        .create_session(CreateSessionRequest {
            user_id: user.0,
            scenario_id,
            profession: body.profession,
            difficulty: body.difficulty,
            scenario_type: body.scenario_type,
            persona: body.persona,
        })
        .await?;

    let ws_base = state.config().services.public_ws_url.trim_end_matches('/');
    let created = CreatedSession {
        session_id: ticket.session_id,
        websocket_url: format!(
            "{ws_base}/ws/sessions/{}?token={}",
            ticket.session_id, ticket.join_token
        ),
        join_token: ticket.join_token,
        room_handle: ticket.room_name,
        room_url: ticket.room_url,
    };

    let self_link = format!("/api/v1/sessions/{}", created.session_id);
    Ok(Json(clock.respond(created).with_link("self", &self_link)))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let clock = RequestClock::start();
    let id = parse_uuid(&id)?;
    let session = owned_session(&state, id, &user).await?;
    Ok(Json(clock.respond(session)))
}

/// POST /api/v1/sessions/{id}/complete
pub async fn complete_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    body: Option<Json<CompleteBody>>,
) -> Result<Json<ApiResponse<CompletedSession>>, AppError> {
    let clock = RequestClock::start();
    let id = parse_uuid(&id)?;
    owned_session(&state, id, &user).await?;

    let duration = body.and_then(|Json(b)| b.duration);
    let completion = state.orchestrator.complete_session(id, duration).await?;

    Ok(Json(clock.respond(CompletedSession {
        status: completion.session.status,
        duration_seconds: completion.duration_seconds,
        feedback: completion.feedback,
    })))
}

/// POST /api/v1/sessions/{id}/cancel
pub async fn cancel_session(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StatusOnly>>, AppError> {
    let clock = RequestClock::start();
    let id = parse_uuid(&id)?;
    owned_session(&state, id, &user).await?;

    state.orchestrator.cancel_session(id).await?;
    Ok(Json(clock.respond(StatusOnly {
        status: SessionStatus::Cancelled,
    })))
}
