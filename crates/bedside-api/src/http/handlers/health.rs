//! GET /health

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": orchestrator.registry().len(),
        "connections": orchestrator.multiplexer().connection_count(),
    }))
}
