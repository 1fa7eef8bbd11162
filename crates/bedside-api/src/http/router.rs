//! Axum router configuration with middleware.
//!
//! REST routes live under `/api/v1/`, the session channel under `/ws/`.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", post(handlers::session::create_session))
        .route("/sessions/{id}", get(handlers::session::get_session))
        .route(
            "/sessions/{id}/complete",
            post(handlers::session::complete_session),
        )
        .route(
            "/sessions/{id}/cancel",
            post(handlers::session::cancel_session),
        )
        .route("/scenarios", get(handlers::scenario::list_scenarios));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/sessions/{id}", get(handlers::ws::ws_handler))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
