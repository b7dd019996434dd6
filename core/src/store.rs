//! Storage traits for tickets and the fraud audit trail.
//!
//! The validation engine depends on these traits only; concrete
//! implementations live in `turnstile-postgres` (production) and
//! [`crate::memory`] (single-process deployments and tests).

use crate::types::{NewFraudAttempt, NewTicket, Ticket, TicketId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by store implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The generated token collided with an existing ticket's token.
    ///
    /// Exceptionally rare; callers regenerate the token and retry creation.
    #[error("duplicate ticket token")]
    DuplicateToken,

    /// The row lock could not be acquired within the store's configured
    /// timeout. The enclosing transaction has been rolled back.
    #[error("timed out waiting for row lock")]
    LockTimeout,

    /// Any other storage failure (connection, commit, constraint).
    #[error("database error: {0}")]
    Database(String),
}

/// Durable CRUD for ticket records with transactional mutation support.
///
/// Implementations own the full ticket lifecycle: they assign id, token and
/// purchase state at creation, and they are the only component allowed to
/// persist the `Pending` → `Used` transition (via [`ValidationTx`]).
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket: assigns a fresh unique token, `Pending` state
    /// and a new id.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateToken`] if the generated token collides with
    /// any token ever issued; the caller should retry. Other failures map to
    /// [`StoreError::Database`].
    async fn create(&self, new: NewTicket) -> Result<Ticket, StoreError>;

    /// Plain (unlocked) lookup by token.
    ///
    /// Never used on the validation path, which must go through
    /// [`ValidationTx::lock_by_token`] instead.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on storage failure.
    async fn find_by_token(&self, token: &str) -> Result<Option<Ticket>, StoreError>;

    /// Open a transaction scoped to one validation attempt.
    ///
    /// All reads and writes of the attempt go through the returned
    /// [`ValidationTx`]; dropping it without commit rolls everything back.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if the transaction cannot be opened.
    async fn begin(&self) -> Result<Box<dyn ValidationTx>, StoreError>;
}

/// One open validation transaction.
///
/// Writes performed through this handle become visible atomically at
/// [`commit`](Self::commit); until then concurrent validators of the same
/// token are blocked on [`lock_by_token`](Self::lock_by_token).
#[async_trait]
pub trait ValidationTx: Send {
    /// Acquire an exclusive row-level lock on the ticket with this token and
    /// return its current committed state.
    ///
    /// Blocks while another transaction holds the lock on the same token;
    /// after acquisition the caller observes that transaction's committed
    /// effect. Returns `None` if no ticket carries the token.
    ///
    /// # Errors
    ///
    /// [`StoreError::LockTimeout`] if the lock cannot be acquired within the
    /// store's timeout; [`StoreError::Database`] on other failures.
    async fn lock_by_token(&mut self, token: &str) -> Result<Option<Ticket>, StoreError>;

    /// Persist the `Pending` → `Used` transition within this transaction.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on storage failure.
    async fn mark_used(&mut self, id: TicketId, used_at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Append a fraud attempt within this transaction.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on storage failure.
    async fn record_fraud(&mut self, attempt: NewFraudAttempt) -> Result<(), StoreError>;

    /// Commit every effect of this attempt atomically.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if the commit fails; the transaction is
    /// aborted and none of its effects persist.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every effect of this attempt.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] if the rollback itself fails; the
    /// transaction is still terminated.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
