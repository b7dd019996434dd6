//! The ticket validation engine.
//!
//! One call to [`ValidationEngine::validate`] is one atomic attempt: acquire
//! the row lock for the scanned token, decide the outcome, record a fraud
//! attempt on rejection, and commit everything as a single unit. The
//! lock-then-branch sequence inside one transaction is what makes admission
//! exactly-once: of two concurrent scans of the same ticket, the second
//! locker always observes the first locker's committed `Used` state.

use crate::environment::Clock;
use crate::store::{StoreError, TicketStore, ValidationTx};
use crate::types::{Actor, FraudReason, GateId, NewFraudAttempt, TicketState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Why a validation attempt was rejected, as reported to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionCode {
    /// No ticket exists with the scanned token. Deliberately also covers
    /// malformed tokens, so probing the gate leaks nothing about token
    /// shape.
    TicketNotFound,
    /// The ticket was already consumed.
    TicketAlreadyUsed,
}

impl RejectionCode {
    /// Stable wire code for API responses and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TicketNotFound => "TICKET_NOT_FOUND",
            Self::TicketAlreadyUsed => "TICKET_ALREADY_USED",
        }
    }
}

/// Outcome of one validation attempt.
///
/// Rejections are first-class results of a *successful* transaction (the
/// fraud record committed), not errors; infrastructure failures surface as
/// [`ValidationError`] instead and must never be conflated with these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    /// The ticket was pending and is now consumed; admit the guest.
    Admitted {
        /// Customer the ticket was issued to, for the gate display.
        customer_name: String,
        /// Consumption timestamp, set by this attempt.
        used_at: DateTime<Utc>,
    },
    /// The ticket is invalid; a fraud attempt has been durably recorded.
    Rejected {
        /// Why the attempt was rejected.
        code: RejectionCode,
        /// For `TicketAlreadyUsed`, when the ticket was originally consumed.
        used_at: Option<DateTime<Utc>>,
    },
}

/// Failures of the validation operation itself.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The actor lacks validator privilege. Raised before any storage
    /// interaction; nothing is recorded.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Human-readable refusal reason.
        reason: &'static str,
    },

    /// Infrastructure failure. The transaction was rolled back: the ticket
    /// keeps its pre-attempt state and no fraud record persists. The engine
    /// never retries; the gate device may resubmit.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates single validation attempts against a [`TicketStore`].
///
/// Holds no ticket state of its own: every attempt re-reads the
/// authoritative row under lock, because cached state would reintroduce the
/// double-admission race.
pub struct ValidationEngine {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
}

impl ValidationEngine {
    /// Creates an engine over the given store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate one scanned token at one gate, on behalf of `actor`.
    ///
    /// Exactly one of three things happens, atomically:
    /// - the ticket transitions `Pending` → `Used` and the guest is admitted;
    /// - a fraud attempt is recorded and the scan is rejected;
    /// - nothing persists and an error is returned.
    ///
    /// # Errors
    ///
    /// [`ValidationError::Unauthorized`] if `actor` lacks validator
    /// privilege (checked before any storage interaction);
    /// [`ValidationError::Store`] if the store fails, in which case the
    /// transaction has been rolled back and no partial effect is observable.
    pub async fn validate(
        &self,
        scanned_token: &str,
        gate_id: GateId,
        actor: Actor,
    ) -> Result<ValidationOutcome, ValidationError> {
        if !actor.role.can_validate() {
            tracing::warn!(
                actor_id = %actor.id,
                role = %actor.role,
                gate_id = %gate_id,
                "validation refused: actor lacks validator privilege"
            );
            return Err(ValidationError::Unauthorized {
                reason: "only validators may validate tickets",
            });
        }

        let mut tx = self.store.begin().await?;

        match self.decide(tx.as_mut(), scanned_token, &gate_id, actor).await {
            Ok(outcome) => {
                if let Err(err) = tx.commit().await {
                    tracing::error!(
                        gate_id = %gate_id,
                        error = %err,
                        "validation commit failed, transaction aborted"
                    );
                    metrics::counter!("turnstile_validations_total", "outcome" => "error")
                        .increment(1);
                    return Err(ValidationError::Store(err));
                }
                self.report(scanned_token, &gate_id, &outcome);
                Ok(outcome)
            }
            Err(err) => {
                // Explicit rollback so a lock timeout or write failure never
                // leaves a dangling open transaction.
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        error = %rollback_err,
                        "rollback failed after validation error"
                    );
                }
                tracing::error!(
                    gate_id = %gate_id,
                    error = %err,
                    "validation attempt failed, transaction rolled back"
                );
                metrics::counter!("turnstile_validations_total", "outcome" => "error")
                    .increment(1);
                Err(ValidationError::Store(err))
            }
        }
    }

    /// Walk the decision lattice under the row lock.
    ///
    /// `TOKEN_NOT_FOUND` → `ALREADY_USED` → `VALID_FOR_USE`; fraud records
    /// share the enclosing transaction so the decision and its audit trail
    /// commit (or vanish) together.
    async fn decide(
        &self,
        tx: &mut dyn ValidationTx,
        scanned_token: &str,
        gate_id: &GateId,
        actor: Actor,
    ) -> Result<ValidationOutcome, StoreError> {
        let Some(ticket) = tx.lock_by_token(scanned_token).await? else {
            tx.record_fraud(NewFraudAttempt {
                scanned_token: scanned_token.to_owned(),
                reason: FraudReason::TokenNotFound,
                gate_id: gate_id.clone(),
                actor_id: actor.id,
                attempted_at: self.clock.now(),
            })
            .await?;
            return Ok(ValidationOutcome::Rejected {
                code: RejectionCode::TicketNotFound,
                used_at: None,
            });
        };

        match ticket.state {
            TicketState::Used => {
                tx.record_fraud(NewFraudAttempt {
                    scanned_token: scanned_token.to_owned(),
                    reason: FraudReason::AlreadyUsed,
                    gate_id: gate_id.clone(),
                    actor_id: actor.id,
                    attempted_at: self.clock.now(),
                })
                .await?;
                Ok(ValidationOutcome::Rejected {
                    code: RejectionCode::TicketAlreadyUsed,
                    used_at: ticket.used_at,
                })
            }
            TicketState::Pending => {
                let used_at = self.clock.now();
                tx.mark_used(ticket.id, used_at).await?;
                Ok(ValidationOutcome::Admitted {
                    customer_name: ticket.customer_name,
                    used_at,
                })
            }
        }
    }

    /// Log and count a committed outcome.
    fn report(&self, scanned_token: &str, gate_id: &GateId, outcome: &ValidationOutcome) {
        match outcome {
            ValidationOutcome::Admitted { used_at, .. } => {
                tracing::info!(
                    token = scanned_token,
                    gate_id = %gate_id,
                    used_at = %used_at,
                    "ticket validated, guest admitted"
                );
                metrics::counter!("turnstile_validations_total", "outcome" => "admitted")
                    .increment(1);
            }
            ValidationOutcome::Rejected { code, .. } => {
                tracing::warn!(
                    token = scanned_token,
                    gate_id = %gate_id,
                    code = code.as_str(),
                    "ticket rejected, fraud attempt recorded"
                );
                metrics::counter!("turnstile_validations_total", "outcome" => "rejected")
                    .increment(1);
                let reason = match code {
                    RejectionCode::TicketNotFound => "TOKEN_NOT_FOUND",
                    RejectionCode::TicketAlreadyUsed => "ALREADY_USED",
                };
                metrics::counter!("turnstile_fraud_attempts_total", "reason" => reason)
                    .increment(1);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::environment::FixedClock;
    use crate::memory::MemoryTicketStore;
    use crate::types::{ActorId, LineItem, Money, NewTicket, OwnerId, Ticket, TicketId};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn admin() -> Actor {
        Actor::new(ActorId::from_uuid(Uuid::new_v4()), crate::types::Role::Admin)
    }

    fn plain_user() -> Actor {
        Actor::new(ActorId::from_uuid(Uuid::new_v4()), crate::types::Role::User)
    }

    fn gate() -> GateId {
        GateId::new("main-gate-1".to_string())
    }

    fn new_ticket() -> NewTicket {
        NewTicket {
            customer_name: "Jane Doe".to_string(),
            customer_email: "jane.doe@example.com".to_string(),
            event_name: "Summer Festival".to_string(),
            amount: Money::from_cents(30_000),
            line_items: vec![LineItem::new(
                "vip".to_string(),
                1,
                Money::from_cents(30_000),
                Money::from_cents(30_000),
            )],
            owner_id: OwnerId::from_uuid(Uuid::new_v4()),
            purchased_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    fn engine(store: Arc<MemoryTicketStore>) -> ValidationEngine {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 21, 20, 0, 0).unwrap());
        ValidationEngine::new(store, Arc::new(clock))
    }

    #[tokio::test]
    async fn pending_ticket_is_admitted_then_rejected() {
        // First scan admits and stamps used_at, the second scan is rejected
        // carrying the original used_at.
        let store = Arc::new(MemoryTicketStore::new());
        let ticket = store.create(new_ticket()).await.expect("create ticket");
        let engine = engine(store.clone());

        let first = engine
            .validate(ticket.token.as_str(), gate(), admin())
            .await
            .expect("first validation");
        let ValidationOutcome::Admitted { customer_name, used_at } = first else {
            panic!("expected admission, got {first:?}");
        };
        assert_eq!(customer_name, "Jane Doe");

        let second = engine
            .validate(ticket.token.as_str(), gate(), admin())
            .await
            .expect("second validation");
        assert_eq!(
            second,
            ValidationOutcome::Rejected {
                code: RejectionCode::TicketAlreadyUsed,
                used_at: Some(used_at),
            }
        );
    }

    #[tokio::test]
    async fn unknown_token_is_rejected_and_audited() {
        let store = Arc::new(MemoryTicketStore::new());
        let engine = engine(store.clone());

        let outcome = engine
            .validate("TKT-ZZZZZZZZ", gate(), admin())
            .await
            .expect("validation");
        assert_eq!(
            outcome,
            ValidationOutcome::Rejected {
                code: RejectionCode::TicketNotFound,
                used_at: None,
            }
        );

        let attempts = store.fraud_attempts().await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].scanned_token, "TKT-ZZZZZZZZ");
        assert_eq!(attempts[0].reason, FraudReason::TokenNotFound);
    }

    #[tokio::test]
    async fn concurrent_scans_admit_exactly_once() {
        // Two simultaneous scans of one pending ticket: at most one may win.
        let store = Arc::new(MemoryTicketStore::new());
        let ticket = store.create(new_ticket()).await.expect("create ticket");
        let engine = Arc::new(engine(store.clone()));

        let mut handles = Vec::new();
        for i in 0..2 {
            let engine = engine.clone();
            let token = ticket.token.as_str().to_owned();
            handles.push(tokio::spawn(async move {
                engine
                    .validate(&token, GateId::new(format!("gate-{i}")), admin())
                    .await
            }));
        }

        let mut admitted = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.await.expect("task").expect("validation") {
                ValidationOutcome::Admitted { .. } => admitted += 1,
                ValidationOutcome::Rejected {
                    code: RejectionCode::TicketAlreadyUsed,
                    ..
                } => already_used += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(already_used, 1);
        assert_eq!(store.fraud_attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn non_validator_is_refused_without_storage_interaction() {
        let store = Arc::new(MemoryTicketStore::new());
        let ticket = store.create(new_ticket()).await.expect("create ticket");
        let engine = engine(store.clone());

        let err = engine
            .validate(ticket.token.as_str(), gate(), plain_user())
            .await
            .expect_err("user role must be refused");
        assert!(matches!(err, ValidationError::Unauthorized { .. }));

        // No fraud record, ticket untouched.
        assert!(store.fraud_attempts().await.is_empty());
        let reloaded = store
            .find_by_token(ticket.token.as_str())
            .await
            .expect("lookup")
            .expect("ticket exists");
        assert_eq!(reloaded.state, TicketState::Pending);
        assert_eq!(reloaded.used_at, None);
    }

    #[tokio::test]
    async fn repeated_rejections_accumulate_fraud_records() {
        // N rescans of a used ticket yield N rejections and N records.
        let store = Arc::new(MemoryTicketStore::new());
        let ticket = store.create(new_ticket()).await.expect("create ticket");
        let engine = engine(store.clone());

        engine
            .validate(ticket.token.as_str(), gate(), admin())
            .await
            .expect("consume ticket");

        for _ in 0..3 {
            let outcome = engine
                .validate(ticket.token.as_str(), gate(), admin())
                .await
                .expect("rescan");
            assert!(matches!(
                outcome,
                ValidationOutcome::Rejected {
                    code: RejectionCode::TicketAlreadyUsed,
                    ..
                }
            ));
        }
        assert_eq!(store.fraud_attempts().await.len(), 3);
    }

    #[tokio::test]
    async fn used_at_never_changes_once_set() {
        // The stamp from the admitting attempt is permanent.
        let store = Arc::new(MemoryTicketStore::new());
        let ticket = store.create(new_ticket()).await.expect("create ticket");

        let first_clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 21, 20, 0, 0).unwrap());
        let first_engine = ValidationEngine::new(store.clone(), Arc::new(first_clock));
        first_engine
            .validate(ticket.token.as_str(), gate(), admin())
            .await
            .expect("consume ticket");

        let later_clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 21, 23, 0, 0).unwrap());
        let later_engine = ValidationEngine::new(store.clone(), Arc::new(later_clock));
        let outcome = later_engine
            .validate(ticket.token.as_str(), gate(), admin())
            .await
            .expect("rescan");

        assert_eq!(
            outcome,
            ValidationOutcome::Rejected {
                code: RejectionCode::TicketAlreadyUsed,
                used_at: Some(Utc.with_ymd_and_hms(2025, 6, 21, 20, 0, 0).unwrap()),
            }
        );
    }

    // ------------------------------------------------------------------
    // Injected failure between lock and commit leaves no trace.
    // ------------------------------------------------------------------

    struct FailingStore {
        inner: Arc<MemoryTicketStore>,
    }

    struct FailingTx {
        inner: Box<dyn ValidationTx>,
    }

    #[async_trait]
    impl TicketStore for FailingStore {
        async fn create(&self, new: NewTicket) -> Result<Ticket, StoreError> {
            self.inner.create(new).await
        }

        async fn find_by_token(&self, token: &str) -> Result<Option<Ticket>, StoreError> {
            self.inner.find_by_token(token).await
        }

        async fn begin(&self) -> Result<Box<dyn ValidationTx>, StoreError> {
            Ok(Box::new(FailingTx {
                inner: self.inner.begin().await?,
            }))
        }
    }

    #[async_trait]
    impl ValidationTx for FailingTx {
        async fn lock_by_token(&mut self, token: &str) -> Result<Option<Ticket>, StoreError> {
            self.inner.lock_by_token(token).await
        }

        async fn mark_used(
            &mut self,
            _id: TicketId,
            _used_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Database("injected write failure".to_string()))
        }

        async fn record_fraud(&mut self, _attempt: NewFraudAttempt) -> Result<(), StoreError> {
            Err(StoreError::Database("injected write failure".to_string()))
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            Err(StoreError::Database("injected commit failure".to_string()))
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn injected_failure_leaves_no_partial_effects() {
        let memory = Arc::new(MemoryTicketStore::new());
        let ticket = memory.create(new_ticket()).await.expect("create ticket");
        let store = Arc::new(FailingStore {
            inner: memory.clone(),
        });
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 21, 20, 0, 0).unwrap());
        let engine = ValidationEngine::new(store, Arc::new(clock));

        let err = engine
            .validate(ticket.token.as_str(), gate(), admin())
            .await
            .expect_err("injected failure must surface");
        assert!(matches!(err, ValidationError::Store(_)));

        // Pre-attempt state fully preserved.
        let reloaded = memory
            .find_by_token(ticket.token.as_str())
            .await
            .expect("lookup")
            .expect("ticket exists");
        assert_eq!(reloaded.state, TicketState::Pending);
        assert_eq!(reloaded.used_at, None);
        assert!(memory.fraud_attempts().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_token_failure_records_nothing() {
        // The not-found branch also rolls back cleanly when the fraud write
        // fails.
        let memory = Arc::new(MemoryTicketStore::new());
        let store = Arc::new(FailingStore {
            inner: memory.clone(),
        });
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 21, 20, 0, 0).unwrap());
        let engine = ValidationEngine::new(store, Arc::new(clock));

        let err = engine
            .validate("TKT-ZZZZZZZZ", gate(), admin())
            .await
            .expect_err("injected failure must surface");
        assert!(matches!(err, ValidationError::Store(_)));
        assert!(memory.fraud_attempts().await.is_empty());
    }
}
