//! Outbound email transport.
//!
//! Supports:
//! - **SendGrid**: v3 HTTP API via reqwest
//! - **SMTP**: any relay via lettre

pub mod sendgrid;
pub mod smtp;

pub use sendgrid::SendGridTransport;
pub use smtp::SmtpTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::TransportConfig;
use crate::error::{Error, TransportError};

/// A fully composed outbound message (token footer already embedded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from_address: String,
    pub from_name: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub reply_to: Option<String>,
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportReceipt {
    /// HTTP status (SendGrid) or SMTP reply code, logged verbatim.
    pub status_code: u16,
}

/// Delivery provider. One call per message; implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short provider tag used in ledger status values (`sg`, `smtp`).
    fn provider(&self) -> &str;

    async fn send(&self, email: &OutboundEmail) -> Result<TransportReceipt, TransportError>;
}

/// Create a transport from configuration.
pub fn create_transport(
    config: &TransportConfig,
    timeout: Duration,
) -> Result<Arc<dyn Transport>, Error> {
    config.validate()?;
    match config {
        TransportConfig::SendGrid { api_key } => {
            tracing::info!("Using SendGrid transport");
            Ok(Arc::new(SendGridTransport::new(api_key.clone(), timeout)?))
        }
        TransportConfig::Smtp {
            host,
            port,
            username,
            password,
        } => {
            tracing::info!("Using SMTP transport ({host}:{port})");
            Ok(Arc::new(SmtpTransport::new(
                host.clone(),
                *port,
                username.clone(),
                password.clone(),
                timeout,
            )))
        }
    }
}
