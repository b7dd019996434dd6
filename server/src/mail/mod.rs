//! Ticket confirmation email sink.
//!
//! Best-effort by contract: ticket issuance must never fail because the
//! mail provider is down, so callers log delivery errors and move on.

mod console;
mod smtp;

pub use console::ConsoleTicketMailer;
pub use smtp::SmtpTicketMailer;

use async_trait::async_trait;
use thiserror::Error;
use turnstile_core::types::Ticket;

/// Email delivery failure.
#[derive(Debug, Error)]
pub enum MailError {
    /// Building or sending the message failed.
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

/// Confirmation-mail provider.
///
/// Abstracts over delivery transports so the issuance path can run with a
/// console logger in development and SMTP in production.
#[async_trait]
pub trait TicketMailer: Send + Sync {
    /// Send the purchase confirmation for a freshly issued ticket.
    ///
    /// `qr_code_url` is the ticket token rendered as a PNG data URL, for
    /// inline embedding.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Delivery`] if the message cannot be built or
    /// handed to the transport.
    async fn send_ticket_confirmation(
        &self,
        ticket: &Ticket,
        qr_code_url: &str,
    ) -> Result<(), MailError>;
}
