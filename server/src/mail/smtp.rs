//! SMTP confirmation mailer using Lettre.

use super::{MailError, TicketMailer};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use turnstile_core::types::Ticket;

/// SMTP mailer, suitable for production use.
#[derive(Clone)]
pub struct SmtpTicketMailer {
    /// SMTP server address.
    smtp_server: String,

    /// SMTP server port.
    smtp_port: u16,

    /// SMTP credentials.
    credentials: Credentials,

    /// Sender email address.
    from_email: String,

    /// Sender display name.
    from_name: String,
}

impl SmtpTicketMailer {
    /// Create a new SMTP mailer.
    #[must_use]
    pub fn new(
        smtp_server: String,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: String,
        from_name: String,
    ) -> Self {
        Self {
            smtp_server,
            smtp_port,
            credentials: Credentials::new(smtp_username, smtp_password),
            from_email,
            from_name,
        }
    }

    /// Build an SMTP transport for sending one message.
    ///
    /// A fresh transport per email avoids connection pooling issues.
    fn build_transport(&self) -> Result<SmtpTransport, MailError> {
        Ok(SmtpTransport::relay(&self.smtp_server)
            .map_err(|e| MailError::Delivery(format!("SMTP relay error: {e}")))?
            .port(self.smtp_port)
            .credentials(self.credentials.clone())
            .build())
    }

    fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    fn html_body(ticket: &Ticket, qr_code_url: &str) -> String {
        let line_rows: String = ticket
            .line_items
            .iter()
            .map(|item| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    item.kind, item.quantity, item.unit_price, item.total
                )
            })
            .collect();

        format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Your ticket for {event}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #2563eb;">Your ticket for {event}</h2>
        <p>Hi {name}, thanks for your purchase on {purchased}. Present this QR code at the gate:</p>
        <p style="margin: 30px 0; text-align: center;">
            <img src="{qr}" alt="{token}" width="256" height="256">
        </p>
        <p style="text-align: center; font-family: monospace; font-size: 18px;">{token}</p>
        <table style="width: 100%; border-collapse: collapse;">
            <tr><th align="left">Entry</th><th align="left">Qty</th><th align="left">Price</th><th align="left">Total</th></tr>
            {rows}
        </table>
        <p style="font-weight: bold;">Total paid: {amount}</p>
        <p style="color: #666; font-size: 14px;">
            Each ticket admits exactly once. Keep this email private.
        </p>
    </div>
</body>
</html>
            "#,
            event = ticket.event_name,
            name = ticket.customer_name,
            purchased = ticket.purchased_at.format("%Y-%m-%d %H:%M UTC"),
            qr = qr_code_url,
            token = ticket.token,
            rows = line_rows,
            amount = ticket.amount,
        )
    }
}

#[async_trait]
impl TicketMailer for SmtpTicketMailer {
    async fn send_ticket_confirmation(
        &self,
        ticket: &Ticket,
        qr_code_url: &str,
    ) -> Result<(), MailError> {
        let email = Message::builder()
            .from(
                self.from_header()
                    .parse()
                    .map_err(|e| MailError::Delivery(format!("invalid from address: {e}")))?,
            )
            .to(ticket
                .customer_email
                .parse()
                .map_err(|e| MailError::Delivery(format!("invalid to address: {e}")))?)
            .subject(format!("Your ticket for {}", ticket.event_name))
            .header(ContentType::TEXT_HTML)
            .body(Self::html_body(ticket, qr_code_url))
            .map_err(|e| MailError::Delivery(format!("failed to build email: {e}")))?;

        let mailer = self.build_transport()?;

        tokio::task::spawn_blocking(move || {
            mailer
                .send(&email)
                .map_err(|e| MailError::Delivery(format!("failed to send email: {e}")))
        })
        .await
        .map_err(|e| MailError::Delivery(format!("email task failed: {e}")))?
        .map(|_| ())
    }
}
