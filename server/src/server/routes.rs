//! Router configuration for the turnstile service.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::tickets;
use axum::{routing::get, routing::post, Router};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - Health checks (no authentication)
/// - Ticket issuance and validation under `/api` (actor headers required,
///   stamped by the upstream auth gateway)
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets/validate", post(tickets::validate_ticket));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
