//! Domain types for the ticket validation system.
//!
//! Value objects, entities and state types shared by every crate in the
//! workspace. The validation engine treats the descriptive payload of a
//! ticket (customer, event, amounts) as opaque data: only `state`, `token`
//! and `used_at` participate in validation decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use crate::token::TicketToken;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for the purchasing account that owns a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Create an `OwnerId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an authenticated principal performing an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(Uuid);

impl ActorId {
    /// Create an `ActorId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a physical or logical scanning station.
///
/// Free-form stable string (e.g. `"main-gate-1"`). The engine records it
/// verbatim on fraud attempts; it never influences the validation decision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateId(String);

impl GateId {
    /// Creates a new `GateId`.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the gate id as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Actor and roles
// ============================================================================

/// Role of an authenticated principal, as supplied by the external auth
/// collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Regular account: may purchase tickets, may not validate them.
    User,
    /// Administrator: validator privilege at the gates.
    Admin,
}

impl Role {
    /// Convert the role to its wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }

    /// Parse a role from its wire representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Whether this role carries validator privilege.
    #[must_use]
    pub const fn can_validate(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authenticated principal, passed explicitly into every operation.
///
/// Identity is never pulled from ambient request context; callers thread the
/// actor through as an argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    /// Principal identifier.
    pub id: ActorId,
    /// Role granted by the auth collaborator.
    pub role: Role,
}

impl Actor {
    /// Creates a new `Actor`.
    #[must_use]
    pub const fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }
}

// ============================================================================
// Money (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Line items
// ============================================================================

/// One purchased entry line on a ticket (e.g. 2x VIP at $100).
///
/// Descriptive payload only: the validation engine never inspects line items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Entry kind (e.g. "vip", "general").
    pub kind: String,
    /// Number of entries of this kind.
    pub quantity: u32,
    /// Price per entry.
    pub unit_price: Money,
    /// Line total.
    pub total: Money,
}

impl LineItem {
    /// Creates a new `LineItem`.
    #[must_use]
    pub const fn new(kind: String, quantity: u32, unit_price: Money, total: Money) -> Self {
        Self {
            kind,
            quantity,
            unit_price,
            total,
        }
    }
}

// ============================================================================
// Ticket entity
// ============================================================================

/// Lifecycle state of a ticket.
///
/// The only legal transition is `Pending` → `Used`, exactly once, never
/// reversible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketState {
    /// Issued, not yet presented at a gate.
    Pending,
    /// Consumed at a gate.
    Used,
}

impl TicketState {
    /// Convert state to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Used => "USED",
        }
    }

    /// Parse state from its database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "USED" => Some(Self::Used),
            _ => None,
        }
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An issued entry ticket.
///
/// Invariant: `used_at` is `Some` iff `state == Used`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier.
    pub id: TicketId,
    /// Externally-facing unique token, embedded in the QR payload.
    pub token: TicketToken,
    /// Full name of the customer.
    pub customer_name: String,
    /// Customer email for the confirmation message.
    pub customer_email: String,
    /// Name of the event this ticket admits to.
    pub event_name: String,
    /// Total paid.
    pub amount: Money,
    /// Purchased entry lines.
    pub line_items: Vec<LineItem>,
    /// Lifecycle state.
    pub state: TicketState,
    /// When the ticket was purchased.
    pub purchased_at: DateTime<Utc>,
    /// When the ticket was consumed, if it has been.
    pub used_at: Option<DateTime<Utc>>,
    /// Purchasing account.
    pub owner_id: OwnerId,
}

/// Payload for creating a new ticket. The store assigns id, token, state and
/// purchase time.
#[derive(Clone, Debug, PartialEq)]
pub struct NewTicket {
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
    /// Purchase timestamp.
    pub purchased_at: DateTime<Utc>,
}

// ============================================================================
// Fraud attempts
// ============================================================================

/// Why a validation attempt was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FraudReason {
    /// The scanned token belongs to a ticket that was already consumed.
    AlreadyUsed,
    /// No ticket exists with the scanned token.
    TokenNotFound,
}

impl FraudReason {
    /// Convert reason to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyUsed => "ALREADY_USED",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
        }
    }

    /// Parse reason from its database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ALREADY_USED" => Some(Self::AlreadyUsed),
            "TOKEN_NOT_FOUND" => Some(Self::TokenNotFound),
            _ => None,
        }
    }
}

impl fmt::Display for FraudReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durably recorded rejected validation attempt.
///
/// Append-only audit record. "Fraud" here means "anomalous scan", not proven
/// malicious intent. The scanned token is stored verbatim and may not
/// resolve to any ticket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FraudAttempt {
    /// Store-assigned identifier.
    pub id: i64,
    /// Raw string presented at the gate.
    pub scanned_token: String,
    /// Why the attempt was rejected.
    pub reason: FraudReason,
    /// Station where the scan happened.
    pub gate_id: GateId,
    /// Validator who performed the scan.
    pub actor_id: ActorId,
    /// When the attempt happened.
    pub attempted_at: DateTime<Utc>,
}

/// Payload for appending a fraud attempt. The store assigns the id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewFraudAttempt {
    /// Raw string presented at the gate.
    pub scanned_token: String,
    /// Why the attempt was rejected.
    pub reason: FraudReason,
    /// Station where the scan happened.
    pub gate_id: GateId,
    /// Validator who performed the scan.
    pub actor_id: ActorId,
    /// When the attempt happened.
    pub attempted_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn role_roundtrip() {
        for role in &[Role::User, Role::Admin] {
            let parsed = Role::parse(role.as_str()).expect("valid role should parse");
            assert_eq!(*role, parsed);
        }
        assert!(Role::parse("SUPERADMIN").is_none());
    }

    #[test]
    fn only_admin_can_validate() {
        assert!(Role::Admin.can_validate());
        assert!(!Role::User.can_validate());
    }

    #[test]
    fn ticket_state_roundtrip() {
        for state in &[TicketState::Pending, TicketState::Used] {
            let parsed = TicketState::parse(state.as_str()).expect("valid state should parse");
            assert_eq!(*state, parsed);
        }
        assert!(TicketState::parse("CANCELLED").is_none());
    }

    #[test]
    fn fraud_reason_roundtrip() {
        for reason in &[FraudReason::AlreadyUsed, FraudReason::TokenNotFound] {
            let parsed = FraudReason::parse(reason.as_str()).expect("valid reason should parse");
            assert_eq!(*reason, parsed);
        }
        assert!(FraudReason::parse("EXPIRED").is_none());
    }

    #[test]
    fn money_display_pads_cents() {
        assert_eq!(Money::from_cents(30_000).to_string(), "$300.00");
        assert_eq!(Money::from_cents(105).to_string(), "$1.05");
        assert_eq!(Money::from_cents(0).to_string(), "$0.00");
    }

    #[test]
    fn money_checked_add_overflow() {
        assert!(Money::from_cents(u64::MAX)
            .checked_add(Money::from_cents(1))
            .is_none());
        assert_eq!(
            Money::from_cents(100).checked_add(Money::from_cents(50)),
            Some(Money::from_cents(150))
        );
    }
}
