//! # Turnstile Core
//!
//! Domain model, storage traits and the ticket validation engine.
//!
//! The system issues event-entry tickets identified by a QR-encoded token
//! and validates them at the gates, guarding against double-use and replay.
//! This crate holds the only genuinely hard logic: the atomic
//! lock-then-branch state machine in [`engine::ValidationEngine`], which
//! decides "valid, now consumed" vs "rejected" for one scanned token and
//! durably records rejected attempts for audit.
//!
//! ## Architecture
//!
//! - [`types`]: value objects and entities (tickets, fraud attempts,
//!   actors); the descriptive ticket payload is opaque to validation.
//! - [`store`]: the [`store::TicketStore`] / [`store::ValidationTx`]
//!   seam; production impl in `turnstile-postgres`, single-process impl in
//!   [`memory`].
//! - [`engine`]: one validation attempt = one transaction = one exclusive
//!   row lock; rejections are committed outcomes carrying a fraud record,
//!   infrastructure failures roll back with no observable partial effect.
//! - [`environment`]: injected dependencies ([`environment::Clock`]).

pub mod engine;
pub mod environment;
pub mod memory;
pub mod store;
pub mod token;
pub mod types;

pub use engine::{RejectionCode, ValidationEngine, ValidationError, ValidationOutcome};
pub use environment::{Clock, SystemClock};
pub use store::{StoreError, TicketStore, ValidationTx};
pub use token::TicketToken;
pub use types::{
    Actor, ActorId, FraudAttempt, FraudReason, GateId, LineItem, Money, NewFraudAttempt,
    NewTicket, OwnerId, Role, Ticket, TicketId, TicketState,
};
