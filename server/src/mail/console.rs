//! Console mailer for development and tests.

use super::{MailError, TicketMailer};
use async_trait::async_trait;
use turnstile_core::types::Ticket;

/// Logs confirmations instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleTicketMailer;

#[async_trait]
impl TicketMailer for ConsoleTicketMailer {
    async fn send_ticket_confirmation(
        &self,
        ticket: &Ticket,
        qr_code_url: &str,
    ) -> Result<(), MailError> {
        tracing::info!(
            to = %ticket.customer_email,
            customer = %ticket.customer_name,
            event = %ticket.event_name,
            token = %ticket.token,
            amount = %ticket.amount,
            qr_bytes = qr_code_url.len(),
            "ticket confirmation (console mailer, not delivered)"
        );
        Ok(())
    }
}
