//! Business metrics for the turnstile service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `turnstile_tickets_issued_total` - Tickets successfully issued
//! - `turnstile_validations_total{outcome}` - Validation attempts by outcome
//!   (admitted, rejected, error)
//! - `turnstile_fraud_attempts_total{reason}` - Recorded fraud attempts by
//!   reason (`TOKEN_NOT_FOUND`, `ALREADY_USED`)

use metrics::describe_counter;

/// Register all business metric descriptions.
///
/// Call once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "turnstile_tickets_issued_total",
        "Total number of tickets successfully issued"
    );
    describe_counter!(
        "turnstile_validations_total",
        "Total validation attempts by outcome (admitted, rejected, error)"
    );
    describe_counter!(
        "turnstile_fraud_attempts_total",
        "Total recorded fraud attempts by reason"
    );

    tracing::info!("Business metrics registered");
}
