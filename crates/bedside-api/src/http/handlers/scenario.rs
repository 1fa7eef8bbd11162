//! GET /api/v1/scenarios - configured scenario catalog.

use axum::Json;
use axum::extract::State;

use bedside_types::scenario::ScenarioDefinition;

use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

pub async fn list_scenarios(State(state): State<AppState>) -> Json<ApiResponse<Vec<ScenarioDefinition>>> {
    let clock = RequestClock::start();
    let scenarios = state.orchestrator.lifecycle().scenarios().to_vec();
    Json(clock.respond(scenarios).with_link("self", "/api/v1/scenarios"))
}
