//! `PostgreSQL` implementation of the turnstile store traits.
//!
//! Validation transactions map directly onto `PostgreSQL` primitives: one
//! `sqlx` transaction per attempt, `SELECT … FOR UPDATE` as the exclusive
//! row lock, and a `SET LOCAL lock_timeout` so a contended lock surfaces as
//! [`StoreError::LockTimeout`] instead of hanging the gate. Global token
//! uniqueness is the `tickets.token` unique constraint; the generator's
//! collision avoidance is merely probabilistic.
//!
//! The schema lives in `schema.sql` next to this crate.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use turnstile_core::store::{StoreError, TicketStore, ValidationTx};
use turnstile_core::token::TicketToken;
use turnstile_core::types::{
    ActorId, GateId, LineItem, NewFraudAttempt, NewTicket, OwnerId, Ticket, TicketId,
    TicketState,
};

/// Default time to wait for a contended row lock before giving up.
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// `PostgreSQL`-backed ticket store.
///
/// Cheap to clone; all clones share the connection pool.
#[derive(Clone)]
pub struct PostgresTicketStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PostgresTicketStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Override how long a validation transaction waits for a row lock.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    /// Access the underlying pool (readiness checks, tests).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error onto the store taxonomy.
///
/// `23505` is the unique-violation class (only `tickets.token` is unique
/// here); `55P03` is `lock_not_available`, `57014` is `query_canceled`,
/// which is what a `lock_timeout` expiry raises.
fn map_sqlx_error(err: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = err {
        match db.code().as_deref() {
            Some("23505") => return StoreError::DuplicateToken,
            Some("55P03" | "57014") => return StoreError::LockTimeout,
            _ => {}
        }
    }
    StoreError::Database(err.to_string())
}

/// Convert a database row to a `Ticket`.
fn row_to_ticket(row: &PgRow) -> Result<Ticket, StoreError> {
    let state_str: String = row.get("state");
    let state = TicketState::parse(&state_str)
        .ok_or_else(|| StoreError::Database(format!("invalid ticket state: {state_str}")))?;

    let line_items_json: serde_json::Value = row.get("line_items");
    let line_items: Vec<LineItem> = serde_json::from_value(line_items_json)
        .map_err(|e| StoreError::Database(format!("invalid line items: {e}")))?;

    let amount_cents: i64 = row.get("amount_cents");
    #[allow(clippy::cast_sign_loss)] // amount_cents is CHECK-constrained >= 0
    let amount = turnstile_core::types::Money::from_cents(amount_cents as u64);

    Ok(Ticket {
        id: TicketId::from_uuid(row.get("id")),
        token: TicketToken::from_string(row.get("token")),
        customer_name: row.get("customer_name"),
        customer_email: row.get("customer_email"),
        event_name: row.get("event_name"),
        amount,
        line_items,
        state,
        purchased_at: row.get("purchased_at"),
        used_at: row.get("used_at"),
        owner_id: OwnerId::from_uuid(row.get("owner_id")),
    })
}

const TICKET_COLUMNS: &str = "id, token, customer_name, customer_email, event_name, \
     amount_cents, line_items, state, purchased_at, used_at, owner_id";

#[async_trait::async_trait]
impl TicketStore for PostgresTicketStore {
    async fn create(&self, new: NewTicket) -> Result<Ticket, StoreError> {
        let id = TicketId::new();
        let token = TicketToken::generate();

        let line_items = serde_json::to_value(&new.line_items)
            .map_err(|e| StoreError::Database(format!("line items not serializable: {e}")))?;

        #[allow(clippy::cast_possible_wrap)] // amounts fit comfortably in i64
        let amount_cents = new.amount.cents() as i64;

        sqlx::query(
            r"
            INSERT INTO tickets (
                id, token, customer_name, customer_email, event_name,
                amount_cents, line_items, state, purchased_at, owner_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(id.as_uuid())
        .bind(token.as_str())
        .bind(&new.customer_name)
        .bind(&new.customer_email)
        .bind(&new.event_name)
        .bind(amount_cents)
        .bind(&line_items)
        .bind(TicketState::Pending.as_str())
        .bind(new.purchased_at)
        .bind(new.owner_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&e))?;

        tracing::info!(
            ticket_id = %id,
            token = token.as_str(),
            event = %new.event_name,
            "ticket persisted"
        );

        Ok(Ticket {
            id,
            token,
            customer_name: new.customer_name,
            customer_email: new.customer_email,
            event_name: new.event_name,
            amount: new.amount,
            line_items: new.line_items,
            state: TicketState::Pending,
            purchased_at: new.purchased_at,
            used_at: None,
            owner_id: new.owner_id,
        })
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Ticket>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&e))?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn ValidationTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(&e))?;

        // Bound lock waits for this transaction only; an expiry aborts the
        // transaction and maps to StoreError::LockTimeout.
        let lock_timeout_ms = self.lock_timeout_ms;
        sqlx::query(&format!("SET LOCAL lock_timeout = {lock_timeout_ms}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&e))?;

        Ok(Box::new(PostgresValidationTx { tx }))
    }
}

/// One open validation transaction over `PostgreSQL`.
///
/// Dropping it without commit rolls everything back (sqlx transaction
/// semantics), so an abandoned attempt can never half-apply.
struct PostgresValidationTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl ValidationTx for PostgresValidationTx {
    async fn lock_by_token(&mut self, token: &str) -> Result<Option<Ticket>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE token = $1 FOR UPDATE"
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(&e))?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn mark_used(
        &mut self,
        id: TicketId,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE tickets
            SET state = $1, used_at = $2
            WHERE id = $3 AND state = $4
            ",
        )
        .bind(TicketState::Used.as_str())
        .bind(used_at)
        .bind(id.as_uuid())
        .bind(TicketState::Pending.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(&e))?;

        // The row is held under FOR UPDATE, so anything but exactly one
        // update means the caller's view of the ticket is wrong.
        if result.rows_affected() != 1 {
            return Err(StoreError::Database(format!(
                "ticket {id} was not pending at mark_used"
            )));
        }
        Ok(())
    }

    async fn record_fraud(&mut self, attempt: NewFraudAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO fraud_attempts (
                scanned_token, reason, gate_id, actor_id, attempted_at
            ) VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&attempt.scanned_token)
        .bind(attempt.reason.as_str())
        .bind(attempt.gate_id.as_str())
        .bind(attempt.actor_id.as_uuid())
        .bind(attempt.attempted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(&e))?;

        tracing::warn!(
            scanned_token = %attempt.scanned_token,
            reason = attempt.reason.as_str(),
            gate_id = attempt.gate_id.as_str(),
            actor_id = %attempt.actor_id,
            "fraud attempt staged in validation transaction"
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error(&e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error(&e))
    }
}

/// Load a page of the fraud audit trail, newest first.
///
/// Not part of the validation path (the engine never reads fraud records
/// back); intended for audit review tooling.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub async fn list_fraud_attempts(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<turnstile_core::types::FraudAttempt>, StoreError> {
    let rows = sqlx::query(
        r"
        SELECT id, scanned_token, reason, gate_id, actor_id, attempted_at
        FROM fraud_attempts
        ORDER BY attempted_at DESC, id DESC
        LIMIT $1
        ",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error(&e))?;

    rows.iter()
        .map(|row| {
            let reason_str: String = row.get("reason");
            let reason = turnstile_core::types::FraudReason::parse(&reason_str)
                .ok_or_else(|| {
                    StoreError::Database(format!("invalid fraud reason: {reason_str}"))
                })?;
            Ok(turnstile_core::types::FraudAttempt {
                id: row.get("id"),
                scanned_token: row.get("scanned_token"),
                reason,
                gate_id: GateId::new(row.get("gate_id")),
                actor_id: ActorId::from_uuid(row.get("actor_id")),
                attempted_at: row.get("attempted_at"),
            })
        })
        .collect()
}
