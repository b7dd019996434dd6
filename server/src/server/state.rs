//! Application state for the turnstile HTTP server.

use crate::issuance::TicketIssuer;
use sqlx::PgPool;
use std::sync::Arc;
use turnstile_core::engine::ValidationEngine;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// The validation engine (one transaction per scan).
    pub engine: Arc<ValidationEngine>,

    /// Ticket issuance orchestration (create + QR + confirmation mail).
    pub issuer: Arc<TicketIssuer>,

    /// Database pool for readiness probes. `None` when running over the
    /// in-memory store (dev/test mode).
    pub db: Option<PgPool>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        engine: Arc<ValidationEngine>,
        issuer: Arc<TicketIssuer>,
        db: Option<PgPool>,
    ) -> Self {
        Self { engine, issuer, db }
    }
}
