//! Ticket token generation.
//!
//! Tokens are the externally-facing identity of a ticket: a fixed prefix
//! followed by eight uppercase hex characters taken from a freshly generated
//! v4 UUID. Collisions are astronomically unlikely but not excluded; the
//! store-level uniqueness constraint is the actual guarantee, and callers of
//! [`TicketStore::create`](crate::store::TicketStore::create) retry
//! generation on the rare `DuplicateToken` error.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix shared by every issued token.
pub const TOKEN_PREFIX: &str = "TKT-";

/// Number of random characters following the prefix.
pub const TOKEN_RANDOM_LEN: usize = 8;

/// Externally-facing unique string token identifying one ticket.
///
/// Immutable once issued; embedded verbatim in the ticket's QR code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketToken(String);

impl TicketToken {
    /// Generates a fresh token: `TKT-` plus the first eight hex characters
    /// of a random v4 UUID, uppercased.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        let suffix: String = uuid
            .chars()
            .take(TOKEN_RANDOM_LEN)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self(format!("{TOKEN_PREFIX}{suffix}"))
    }

    /// Wraps an existing token string, e.g. when loading from the store.
    ///
    /// No format check is applied: validation deliberately treats malformed
    /// strings the same as unknown tokens.
    #[must_use]
    pub const fn from_string(token: String) -> Self {
        Self(token)
    }

    /// Returns the token as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TicketToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn generated_token_has_expected_shape() {
        let token = TicketToken::generate();
        let s = token.as_str();
        assert!(s.starts_with(TOKEN_PREFIX));
        let suffix = &s[TOKEN_PREFIX.len()..];
        assert_eq!(suffix.len(), TOKEN_RANDOM_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_tokens_differ() {
        // Not a uniqueness proof, just a sanity check that the generator
        // actually draws fresh randomness.
        let a = TicketToken::generate();
        let b = TicketToken::generate();
        assert_ne!(a, b);
    }
}
