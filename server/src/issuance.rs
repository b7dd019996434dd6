//! Ticket issuance orchestration.
//!
//! Wraps [`TicketStore::create`] with the collision retry loop, renders the
//! QR data URL and fires the best-effort confirmation email. Notification
//! failure never fails issuance; the ticket exists once `create` commits.

use crate::mail::TicketMailer;
use crate::qr;
use std::sync::Arc;
use thiserror::Error;
use turnstile_core::environment::Clock;
use turnstile_core::store::{StoreError, TicketStore};
use turnstile_core::types::{LineItem, Money, NewTicket, OwnerId, Ticket};

/// How many times to regenerate a colliding token before giving up.
///
/// Collisions are vanishingly rare; hitting this budget means something is
/// systematically wrong with the random source.
const TOKEN_RETRY_BUDGET: u32 = 3;

/// Failures of the issuance operation.
#[derive(Debug, Error)]
pub enum IssueError {
    /// Token generation collided on every retry.
    #[error("token generation exhausted {TOKEN_RETRY_BUDGET} retries")]
    TokenExhausted,

    /// QR rendering failed.
    #[error("qr rendering failed: {0}")]
    Qr(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Request payload for issuing one ticket.
#[derive(Clone, Debug)]
pub struct IssueRequest {
    /// Full name of the customer.
    pub customer_name: String,
    /// Customer email for the confirmation message.
    pub customer_email: String,
    /// Name of the event.
    pub event_name: String,
    /// Total paid.
    pub amount: Money,
    /// Purchased entry lines.
    pub line_items: Vec<LineItem>,
    /// Purchasing account.
    pub owner_id: OwnerId,
}

/// A freshly issued ticket plus its rendered QR code.
#[derive(Clone, Debug)]
pub struct IssuedTicket {
    /// The persisted ticket (state `Pending`).
    pub ticket: Ticket,
    /// Token rendered as a PNG data URL.
    pub qr_code_url: String,
}

/// Orchestrates ticket creation.
pub struct TicketIssuer {
    store: Arc<dyn TicketStore>,
    mailer: Arc<dyn TicketMailer>,
    clock: Arc<dyn Clock>,
}

impl TicketIssuer {
    /// Creates an issuer over the given store, mailer and clock.
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        mailer: Arc<dyn TicketMailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
        }
    }

    /// Issue one ticket: persist it with a fresh token, render the QR code
    /// and send the confirmation email (best effort).
    ///
    /// Each call mints a new ticket; issuance is deliberately not
    /// idempotent across repeated calls.
    ///
    /// # Errors
    ///
    /// [`IssueError::TokenExhausted`] if token generation keeps colliding,
    /// [`IssueError::Qr`] if rendering fails, [`IssueError::Store`] on
    /// storage failure. Mail failures are logged, never returned.
    pub async fn issue(&self, request: IssueRequest) -> Result<IssuedTicket, IssueError> {
        let ticket = self.create_with_retry(request).await?;

        let qr_code_url = qr::data_url(ticket.token.as_str()).map_err(IssueError::Qr)?;

        if let Err(err) = self
            .mailer
            .send_ticket_confirmation(&ticket, &qr_code_url)
            .await
        {
            tracing::warn!(
                ticket_id = %ticket.id,
                to = %ticket.customer_email,
                error = %err,
                "confirmation email failed, ticket issued anyway"
            );
        }

        metrics::counter!("turnstile_tickets_issued_total").increment(1);
        tracing::info!(
            ticket_id = %ticket.id,
            token = %ticket.token,
            event = %ticket.event_name,
            "ticket issued"
        );

        Ok(IssuedTicket {
            ticket,
            qr_code_url,
        })
    }

    /// Run `create`, regenerating the token on the rare collision.
    async fn create_with_retry(&self, request: IssueRequest) -> Result<Ticket, IssueError> {
        let new = NewTicket {
            customer_name: request.customer_name,
            customer_email: request.customer_email,
            event_name: request.event_name,
            amount: request.amount,
            line_items: request.line_items,
            owner_id: request.owner_id,
            purchased_at: self.clock.now(),
        };

        for attempt in 1..=TOKEN_RETRY_BUDGET {
            match self.store.create(new.clone()).await {
                Ok(ticket) => return Ok(ticket),
                Err(StoreError::DuplicateToken) => {
                    tracing::warn!(attempt, "ticket token collided, regenerating");
                }
                Err(other) => return Err(IssueError::Store(other)),
            }
        }
        Err(IssueError::TokenExhausted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::mail::MailError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use turnstile_core::environment::FixedClock;
    use turnstile_core::memory::MemoryTicketStore;
    use turnstile_core::types::TicketState;
    use uuid::Uuid;

    struct CountingMailer {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TicketMailer for CountingMailer {
        async fn send_ticket_confirmation(
            &self,
            _ticket: &turnstile_core::types::Ticket,
            _qr_code_url: &str,
        ) -> Result<(), MailError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MailError::Delivery("provider down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn request() -> IssueRequest {
        IssueRequest {
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
        }
    }

    fn issuer(mailer: Arc<CountingMailer>) -> (TicketIssuer, Arc<MemoryTicketStore>) {
        let store = Arc::new(MemoryTicketStore::new());
        let clock = FixedClock::new(
            chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        );
        (
            TicketIssuer::new(store.clone(), mailer, Arc::new(clock)),
            store,
        )
    }

    #[tokio::test]
    async fn issues_pending_ticket_with_qr_and_confirmation() {
        let mailer = Arc::new(CountingMailer {
            sent: AtomicUsize::new(0),
            fail: false,
        });
        let (issuer, store) = issuer(mailer.clone());

        let issued = issuer.issue(request()).await.expect("issue ticket");

        assert_eq!(issued.ticket.state, TicketState::Pending);
        assert!(issued.qr_code_url.starts_with("data:image/png;base64,"));
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
        assert_eq!(store.ticket_count().await, 1);
    }

    /// Store double that reports a token collision for the first N creates.
    struct CollidingStore {
        inner: Arc<MemoryTicketStore>,
        collisions_left: AtomicUsize,
    }

    #[async_trait]
    impl turnstile_core::store::TicketStore for CollidingStore {
        async fn create(
            &self,
            new: turnstile_core::types::NewTicket,
        ) -> Result<turnstile_core::types::Ticket, StoreError> {
            if self
                .collisions_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::DuplicateToken);
            }
            self.inner.create(new).await
        }

        async fn find_by_token(
            &self,
            token: &str,
        ) -> Result<Option<turnstile_core::types::Ticket>, StoreError> {
            self.inner.find_by_token(token).await
        }

        async fn begin(
            &self,
        ) -> Result<Box<dyn turnstile_core::store::ValidationTx>, StoreError> {
            self.inner.begin().await
        }
    }

    fn colliding_issuer(collisions: usize) -> (TicketIssuer, Arc<MemoryTicketStore>) {
        let memory = Arc::new(MemoryTicketStore::new());
        let store = Arc::new(CollidingStore {
            inner: memory.clone(),
            collisions_left: AtomicUsize::new(collisions),
        });
        let mailer = Arc::new(CountingMailer {
            sent: AtomicUsize::new(0),
            fail: false,
        });
        let clock = FixedClock::new(
            chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        );
        (
            TicketIssuer::new(store, mailer, Arc::new(clock)),
            memory,
        )
    }

    #[tokio::test]
    async fn token_collision_is_retried_with_a_fresh_token() {
        let (issuer, store) = colliding_issuer(1);

        let issued = issuer.issue(request()).await.expect("issue ticket");

        assert_eq!(issued.ticket.state, TicketState::Pending);
        assert_eq!(store.ticket_count().await, 1);
    }

    #[tokio::test]
    async fn exhausted_collision_retries_fail_issuance() {
        let (issuer, store) = colliding_issuer(usize::MAX);

        let err = issuer
            .issue(request())
            .await
            .expect_err("collisions on every retry must fail");
        assert!(matches!(err, IssueError::TokenExhausted));
        assert_eq!(store.ticket_count().await, 0);
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_issuance() {
        let mailer = Arc::new(CountingMailer {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let (issuer, store) = issuer(mailer.clone());

        let issued = issuer.issue(request()).await.expect("issue ticket");

        assert_eq!(issued.ticket.state, TicketState::Pending);
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
        assert_eq!(store.ticket_count().await, 1);
    }
}
