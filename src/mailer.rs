//! Notification rendering and SMTP delivery via `lettre`.

use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, SinglePart};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::debug;

use crate::template::{self, DateFormatError};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build mail message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A fully rendered message, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html_body: String,
}

/// Seam for the mail relay so the dispatch loop can be tested with a
/// recording double.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), DeliveryError>;
}

/// Sends through a plain local relay; no authentication in scope.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();
        Self { transport }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        let from: Mailbox = email.from.parse()?;
        let message = Message::builder()
            .to(email.to.parse()?)
            .from(from.clone())
            .sender(from.clone())
            .reply_to(from)
            .subject(email.subject.as_str())
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(email.html_body.clone()),
            )?;
        debug!(to = %email.to, "submitting message to SMTP relay");
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Render the subject and HTML body for one candidate.
///
/// Blank names substitute as empty strings, and the double space an empty
/// name leaves behind is collapsed afterwards.
pub fn render_notification(
    first_name: &str,
    last_name: &str,
    expiry_date: NaiveDate,
    date_format: &str,
    subject_template: &str,
    body_template: &str,
) -> Result<(String, String), DateFormatError> {
    let first_name = if first_name.trim().is_empty() { "" } else { first_name };
    let last_name = if last_name.trim().is_empty() { "" } else { last_name };
    let expiry = template::format_date(expiry_date, date_format)?;
    let values = [
        ("first_name", first_name),
        ("last_name", last_name),
        ("expiry_date", expiry.as_str()),
    ];
    let subject = template::collapse_double_spaces(&template::render(subject_template, &values));
    let body = template::collapse_double_spaces(&template::render(body_template, &values));
    Ok((subject, body))
}
