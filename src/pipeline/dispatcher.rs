//! Outbound dispatcher — stamps the thread token, sends once, records the
//! result.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SenderIdentity;
use crate::error::DispatchError;
use crate::store::{Direction, Ledger, LedgerEntry};
use crate::token::{self, ThreadToken};
use crate::transport::{OutboundEmail, Transport};

use super::types::SendResult;

/// Sends outbound mail through a `Transport` and writes one `outbound` ledger
/// entry per attempt.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    ledger: Arc<dyn Ledger>,
    sender: SenderIdentity,
    reply_to: Option<String>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        ledger: Arc<dyn Ledger>,
        sender: SenderIdentity,
    ) -> Self {
        Self {
            transport,
            ledger,
            sender,
            reply_to: None,
        }
    }

    /// Route replies to this address (normally the polled mailbox).
    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    /// Send one message.
    ///
    /// A missing `token` starts a new thread. The transport is called exactly
    /// once; success and failure both append an `outbound` entry before
    /// returning.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        token: Option<ThreadToken>,
        variant: &str,
    ) -> Result<SendResult, DispatchError> {
        self.sender.validate()?;

        let token = token.unwrap_or_else(ThreadToken::generate);
        let to = to.trim();
        let entry = LedgerEntry::new(Direction::Outbound, token.as_str(), to, subject)
            .with_variant(variant);

        if !is_plausible_address(to) {
            let err = DispatchError::InvalidRecipient(to.to_string());
            self.record_failure(entry, &err).await;
            return Err(err);
        }

        let email = OutboundEmail {
            from_address: self.sender.address.clone(),
            from_name: self.sender.name.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: token::embed(html_body, &token),
            reply_to: self.reply_to.clone(),
        };

        match self.transport.send(&email).await {
            Ok(receipt) => {
                let status = format!("{}:{}", self.transport.provider(), receipt.status_code);
                self.ledger
                    .append(&entry.with_status(status.as_str()).with_note("sent"))
                    .await?;
                info!(to, thread_id = %token, status = %status, "Outbound message sent");
                Ok(SendResult {
                    status,
                    token,
                    transport_status_code: receipt.status_code,
                })
            }
            Err(e) => {
                let err = DispatchError::Transport(e);
                self.record_failure(entry, &err).await;
                Err(err)
            }
        }
    }

    async fn record_failure(&self, entry: LedgerEntry, err: &DispatchError) {
        warn!(to = %entry.to, thread_id = %entry.thread_id, error = %err, "Outbound send failed");
        let entry = entry.with_status("error").with_note(err.to_string());
        if let Err(store) = self.ledger.append(&entry).await {
            warn!(thread_id = %entry.thread_id, error = %store, "Failed to record send failure");
        }
    }
}

fn is_plausible_address(addr: &str) -> bool {
    match addr.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !addr.contains(char::is_whitespace)
        }
        None => false,
    }
}
