//! SMTP transport via lettre. The blocking send runs on the blocking pool.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, Transport as _};
use secrecy::{ExposeSecret, SecretString};

use crate::error::TransportError;

use super::{OutboundEmail, Transport, TransportReceipt};

const PROVIDER: &str = "smtp";

/// Implicit-TLS submission port; anything else uses STARTTLS.
const SMTPS_PORT: u16 = 465;

pub struct SmtpTransport {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    timeout: Duration,
}

impl SmtpTransport {
    pub fn new(
        host: String,
        port: u16,
        username: String,
        password: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            host,
            port,
            username,
            password,
            timeout,
        }
    }

    fn relay(&self) -> Result<lettre::SmtpTransport, TransportError> {
        let builder = if self.port == SMTPS_PORT {
            lettre::SmtpTransport::relay(&self.host)
        } else {
            lettre::SmtpTransport::starttls_relay(&self.host)
        }
        .map_err(|e| send_failed(format!("SMTP relay error: {e}")))?;

        let mut builder = builder.port(self.port).timeout(Some(self.timeout));
        if !self.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.username.clone(),
                self.password.expose_secret().to_string(),
            ));
        }
        Ok(builder.build())
    }
}

fn send_failed(reason: String) -> TransportError {
    TransportError::SendFailed {
        provider: PROVIDER.into(),
        reason,
    }
}

fn parse_mailbox(label: &str, value: &str) -> Result<Mailbox, TransportError> {
    value
        .parse()
        .map_err(|e| send_failed(format!("Invalid {label} address {value:?}: {e}")))
}

/// Compose the MIME message for one outbound email.
pub fn build_message(email: &OutboundEmail) -> Result<Message, TransportError> {
    let from_address = parse_mailbox("from", &email.from_address)?.email;
    let from = Mailbox::new(Some(email.from_name.clone()), from_address);

    let mut builder = Message::builder()
        .from(from)
        .to(parse_mailbox("to", &email.to)?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_HTML);
    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(parse_mailbox("reply-to", reply_to)?);
    }

    builder
        .body(email.html_body.clone())
        .map_err(|e| send_failed(format!("Failed to build email: {e}")))
}

#[async_trait]
impl Transport for SmtpTransport {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, email: &OutboundEmail) -> Result<TransportReceipt, TransportError> {
        let message = build_message(email)?;
        let relay = self.relay()?;

        let task = tokio::task::spawn_blocking(move || relay.send(&message));
        let response = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                return Err(TransportError::Timeout {
                    op: "SMTP send".into(),
                    timeout: self.timeout,
                });
            }
            Ok(Err(join)) => return Err(send_failed(format!("SMTP task failed: {join}"))),
            Ok(Ok(result)) => result.map_err(|e| send_failed(format!("SMTP send failed: {e}")))?,
        };

        let status_code = response.code().to_string().parse().unwrap_or(250);
        tracing::info!(to = %email.to, status = status_code, "SMTP relay accepted message");
        Ok(TransportReceipt { status_code })
    }
}
