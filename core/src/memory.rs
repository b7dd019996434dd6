//! In-memory [`TicketStore`] implementation.
//!
//! Suitable as the single-process substitute for a database-backed store and
//! as the test double for the validation engine. An owned mutex guard held
//! for the lifetime of each transaction plays the role of the row-level
//! exclusive lock: concurrent validation attempts serialize behind it, and
//! the second attempt always observes the first attempt's committed effect.
//! Writes are staged and only applied on commit, so dropping a transaction
//! rolls it back with no partial effects.
//!
//! Multi-process deployments need the storage engine's native locking
//! (`turnstile-postgres`) instead.

use crate::store::{StoreError, TicketStore, ValidationTx};
use crate::token::TicketToken;
use crate::types::{
    FraudAttempt, NewFraudAttempt, NewTicket, Ticket, TicketId, TicketState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
struct MemoryInner {
    /// Tickets keyed by token. Tokens are never deleted, so the key set is
    /// exactly the set of tokens ever issued (global uniqueness).
    tickets: HashMap<String, Ticket>,
    fraud: Vec<FraudAttempt>,
    next_fraud_id: i64,
}

/// Single-process ticket store backed by a mutex-guarded map.
#[derive(Clone, Default)]
pub struct MemoryTicketStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryTicketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the fraud audit trail, in append order.
    pub async fn fraud_attempts(&self) -> Vec<FraudAttempt> {
        self.inner.lock().await.fraud.clone()
    }

    /// Number of tickets ever created.
    pub async fn ticket_count(&self) -> usize {
        self.inner.lock().await.tickets.len()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create(&self, new: NewTicket) -> Result<Ticket, StoreError> {
        let token = TicketToken::generate();
        let mut inner = self.inner.lock().await;

        if inner.tickets.contains_key(token.as_str()) {
            return Err(StoreError::DuplicateToken);
        }

        let ticket = Ticket {
            id: TicketId::new(),
            token: token.clone(),
            customer_name: new.customer_name,
            customer_email: new.customer_email,
            event_name: new.event_name,
            amount: new.amount,
            line_items: new.line_items,
            state: TicketState::Pending,
            purchased_at: new.purchased_at,
            used_at: None,
            owner_id: new.owner_id,
        };
        inner
            .tickets
            .insert(token.into_string(), ticket.clone());
        Ok(ticket)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self.inner.lock().await.tickets.get(token).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn ValidationTx>, StoreError> {
        let guard = self.inner.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            guard,
            staged: Vec::new(),
        }))
    }
}

enum StagedWrite {
    MarkUsed {
        id: TicketId,
        used_at: DateTime<Utc>,
    },
    Fraud(NewFraudAttempt),
}

/// One open transaction over the memory store.
///
/// Holds the store's mutex for its whole lifetime, which serializes every
/// concurrent transaction. Coarser than a per-token lock, but attempts on
/// disjoint tokens only contend for the guard's duration.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryInner>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl ValidationTx for MemoryTx {
    async fn lock_by_token(&mut self, token: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self.guard.tickets.get(token).cloned())
    }

    async fn mark_used(
        &mut self,
        id: TicketId,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.staged.push(StagedWrite::MarkUsed { id, used_at });
        Ok(())
    }

    async fn record_fraud(&mut self, attempt: NewFraudAttempt) -> Result<(), StoreError> {
        self.staged.push(StagedWrite::Fraud(attempt));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        for write in staged {
            match write {
                StagedWrite::MarkUsed { id, used_at } => {
                    let ticket = self
                        .guard
                        .tickets
                        .values_mut()
                        .find(|t| t.id == id)
                        .ok_or_else(|| {
                            StoreError::Database(format!("no ticket with id {id}"))
                        })?;
                    ticket.state = TicketState::Used;
                    ticket.used_at = Some(used_at);
                }
                StagedWrite::Fraud(new) => {
                    let id = self.guard.next_fraud_id;
                    self.guard.next_fraud_id += 1;
                    self.guard.fraud.push(FraudAttempt {
                        id,
                        scanned_token: new.scanned_token,
                        reason: new.reason,
                        gate_id: new.gate_id,
                        actor_id: new.actor_id,
                        attempted_at: new.attempted_at,
                    });
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged writes are simply discarded with the transaction.
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::types::{LineItem, Money, OwnerId};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn new_ticket() -> NewTicket {
        NewTicket {
            customer_name: "Jane Doe".to_string(),
            customer_email: "jane.doe@example.com".to_string(),
            event_name: "Summer Festival".to_string(),
            amount: Money::from_cents(10_000),
            line_items: vec![LineItem::new(
                "general".to_string(),
                2,
                Money::from_cents(5_000),
                Money::from_cents(10_000),
            )],
            owner_id: OwnerId::from_uuid(Uuid::new_v4()),
            purchased_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_assigns_token_and_pending_state() {
        let store = MemoryTicketStore::new();
        let ticket = store.create(new_ticket()).await.expect("create");

        assert!(ticket.token.as_str().starts_with("TKT-"));
        assert_eq!(ticket.state, TicketState::Pending);
        assert_eq!(ticket.used_at, None);

        let found = store
            .find_by_token(ticket.token.as_str())
            .await
            .expect("lookup");
        assert_eq!(found, Some(ticket));
    }

    #[tokio::test]
    async fn staged_writes_apply_only_on_commit() {
        let store = MemoryTicketStore::new();
        let ticket = store.create(new_ticket()).await.expect("create");
        let used_at = Utc.with_ymd_and_hms(2025, 6, 21, 20, 0, 0).unwrap();

        // Rolled-back transaction leaves nothing behind.
        {
            let mut tx = store.begin().await.expect("begin");
            tx.mark_used(ticket.id, used_at).await.expect("stage");
            tx.rollback().await.expect("rollback");
        }
        let untouched = store
            .find_by_token(ticket.token.as_str())
            .await
            .expect("lookup")
            .expect("exists");
        assert_eq!(untouched.state, TicketState::Pending);

        // Committed transaction applies the transition.
        {
            let mut tx = store.begin().await.expect("begin");
            tx.mark_used(ticket.id, used_at).await.expect("stage");
            tx.commit().await.expect("commit");
        }
        let used = store
            .find_by_token(ticket.token.as_str())
            .await
            .expect("lookup")
            .expect("exists");
        assert_eq!(used.state, TicketState::Used);
        assert_eq!(used.used_at, Some(used_at));
    }

    #[tokio::test]
    async fn transactions_serialize_behind_the_guard() {
        let store = MemoryTicketStore::new();
        let ticket = store.create(new_ticket()).await.expect("create");
        let used_at = Utc.with_ymd_and_hms(2025, 6, 21, 20, 0, 0).unwrap();

        let mut first = store.begin().await.expect("begin first");
        let locked = first
            .lock_by_token(ticket.token.as_str())
            .await
            .expect("lock");
        assert!(locked.is_some());

        // A second transaction cannot start while the first holds the guard.
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.begin(),
        )
        .await;
        assert!(second.is_err(), "second transaction should block");

        first.mark_used(ticket.id, used_at).await.expect("stage");
        first.commit().await.expect("commit");

        // After commit the second locker observes the committed state.
        let mut tx = store.begin().await.expect("begin second");
        let observed = tx
            .lock_by_token(ticket.token.as_str())
            .await
            .expect("lock")
            .expect("exists");
        assert_eq!(observed.state, TicketState::Used);
        tx.rollback().await.expect("rollback");
    }
}
