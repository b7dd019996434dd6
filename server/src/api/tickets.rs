//! Ticket API endpoints.
//!
//! - POST /api/tickets - Issue a new QR ticket (any authenticated actor)
//! - POST /api/tickets/validate - Validate a scanned token at a gate
//!   (validator role required)

use crate::api::actor::RequestActor;
use crate::error::AppError;
use crate::issuance::IssueRequest;
use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::engine::{RejectionCode, ValidationOutcome};
use turnstile_core::types::{GateId, LineItem, Money, OwnerId, Ticket};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// One purchased entry line in a creation request.
#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    /// Entry kind (e.g. "vip").
    pub kind: String,
    /// Number of entries of this kind.
    pub quantity: u32,
    /// Price per entry, in cents.
    pub unit_price_cents: u64,
    /// Line total, in cents.
    pub total_cents: u64,
}

/// Request to issue a new ticket.
#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    /// Full name of the customer.
    pub customer_name: String,
    /// Customer email for the confirmation message.
    pub customer_email: String,
    /// Name of the event.
    pub event_name: String,
    /// Total paid, in cents.
    pub amount_cents: u64,
    /// Purchased entry lines.
    pub line_items: Vec<LineItemRequest>,
}

/// Ticket representation in API responses.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    /// Ticket identifier.
    pub id: Uuid,
    /// Scannable token (also the QR payload).
    pub token: String,
    /// Full name of the customer.
    pub customer_name: String,
    /// Customer email.
    pub customer_email: String,
    /// Name of the event.
    pub event_name: String,
    /// Total paid, in cents.
    pub amount_cents: u64,
    /// Lifecycle state (`PENDING` / `USED`).
    pub state: String,
    /// Purchase timestamp.
    pub purchased_at: DateTime<Utc>,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: *ticket.id.as_uuid(),
            token: ticket.token.into_string(),
            customer_name: ticket.customer_name,
            customer_email: ticket.customer_email,
            event_name: ticket.event_name,
            amount_cents: ticket.amount.cents(),
            state: ticket.state.as_str().to_string(),
            purchased_at: ticket.purchased_at,
        }
    }
}

/// Response after issuing a ticket.
#[derive(Debug, Serialize)]
pub struct CreateTicketResponse {
    /// The issued ticket.
    pub ticket: TicketResponse,
    /// Token rendered as a PNG data URL for QR display.
    pub qr_code_url: String,
}

/// Request to validate a scanned token.
#[derive(Debug, Deserialize)]
pub struct ValidateTicketRequest {
    /// Raw token presented at the gate.
    pub scanned_token: String,
    /// Scanning station identifier (e.g. "main-gate-1").
    pub gate_id: String,
}

/// Structured validation outcome.
///
/// Rejections are 200 responses: the transaction succeeded and a fraud
/// attempt was durably recorded. Only authorization and infrastructure
/// failures use error statuses.
#[derive(Debug, Serialize)]
pub struct ValidateTicketResponse {
    /// Whether the guest should be admitted.
    pub admitted: bool,
    /// Rejection code (`TICKET_NOT_FOUND` / `TICKET_ALREADY_USED`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Customer name, on admission, for the gate display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// When the ticket was consumed: this scan on admission, the original
    /// scan on an already-used rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
    /// Human-readable summary.
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Issue a new ticket.
///
/// Requires an authenticated actor (any role). Always mints a new token;
/// repeated calls are not idempotent.
///
/// # Errors
///
/// 401 without valid actor headers, 422 on an invalid payload, 500 on
/// storage/QR failure.
pub async fn create_ticket(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<CreateTicketResponse>), AppError> {
    validate_create_request(&request)?;

    let issued = state
        .issuer
        .issue(IssueRequest {
            customer_name: request.customer_name,
            customer_email: request.customer_email,
            event_name: request.event_name,
            amount: Money::from_cents(request.amount_cents),
            line_items: request
                .line_items
                .into_iter()
                .map(|item| {
                    LineItem::new(
                        item.kind,
                        item.quantity,
                        Money::from_cents(item.unit_price_cents),
                        Money::from_cents(item.total_cents),
                    )
                })
                .collect(),
            owner_id: OwnerId::from_uuid(*actor.id.as_uuid()),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTicketResponse {
            ticket: issued.ticket.into(),
            qr_code_url: issued.qr_code_url,
        }),
    ))
}

/// Validate a scanned token at a gate.
///
/// Requires validator privilege (`ADMIN` role). The outcome is always
/// structured: admission, or a rejection that has already been recorded in
/// the fraud audit trail.
///
/// # Errors
///
/// 401 without valid actor headers, 403 for non-validators, 422 on an
/// invalid payload, 500 (opaque) if the store fails; in that case nothing
/// was recorded and the gate may resubmit.
pub async fn validate_ticket(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Json(request): Json<ValidateTicketRequest>,
) -> Result<Json<ValidateTicketResponse>, AppError> {
    if request.gate_id.trim().is_empty() {
        return Err(AppError::validation("gate_id must not be empty"));
    }

    let outcome = state
        .engine
        .validate(
            &request.scanned_token,
            GateId::new(request.gate_id),
            actor,
        )
        .await?;

    let response = match outcome {
        ValidationOutcome::Admitted {
            customer_name,
            used_at,
        } => ValidateTicketResponse {
            admitted: true,
            code: None,
            customer_name: Some(customer_name),
            used_at: Some(used_at),
            message: "ticket validated, admit guest".to_string(),
        },
        ValidationOutcome::Rejected { code, used_at } => ValidateTicketResponse {
            admitted: false,
            code: Some(code.as_str().to_string()),
            customer_name: None,
            used_at,
            message: match code {
                RejectionCode::TicketNotFound => "ticket not found".to_string(),
                RejectionCode::TicketAlreadyUsed => {
                    "ticket has already been used".to_string()
                }
            },
        },
    };

    Ok(Json(response))
}

fn validate_create_request(request: &CreateTicketRequest) -> Result<(), AppError> {
    if request.customer_name.trim().is_empty() {
        return Err(AppError::validation("customer_name must not be empty"));
    }
    if !request.customer_email.contains('@') {
        return Err(AppError::validation("customer_email must be an email address"));
    }
    if request.event_name.trim().is_empty() {
        return Err(AppError::validation("event_name must not be empty"));
    }
    if request.line_items.is_empty() {
        return Err(AppError::validation("line_items must not be empty"));
    }
    Ok(())
}
