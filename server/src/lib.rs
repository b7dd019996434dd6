//! # Turnstile Server
//!
//! HTTP service for issuing and validating QR entry tickets.
//!
//! The heavy lifting lives in `turnstile-core` (validation engine) and
//! `turnstile-postgres` (durable store with row locks); this crate wires
//! them behind an Axum API, adds ticket issuance orchestration (QR
//! rendering + best-effort confirmation email) and carries the operational
//! surface: config, tracing, metrics, health probes.

pub mod api;
pub mod config;
pub mod error;
pub mod issuance;
pub mod mail;
pub mod metrics;
pub mod qr;
pub mod server;

pub use config::Config;
pub use error::AppError;
pub use issuance::{IssueError, IssueRequest, IssuedTicket, TicketIssuer};
pub use server::{build_router, AppState};
