//! SendGrid v3 `mail/send` transport.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::error::TransportError;

use super::{OutboundEmail, Transport, TransportReceipt};

const SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const PROVIDER: &str = "sg";

pub struct SendGridTransport {
    client: reqwest::Client,
    api_key: SecretString,
    timeout: Duration,
}

impl SendGridTransport {
    pub fn new(api_key: SecretString, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::SendFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            timeout,
        })
    }
}

/// Request body for one single-recipient HTML message.
pub fn build_payload(email: &OutboundEmail) -> Value {
    let mut payload = json!({
        "personalizations": [{ "to": [{ "email": email.to }] }],
        "from": { "email": email.from_address, "name": email.from_name },
        "subject": email.subject,
        "content": [{ "type": "text/html", "value": email.html_body }],
    });
    if let Some(reply_to) = &email.reply_to {
        payload["reply_to"] = json!({ "email": reply_to });
    }
    payload
}

#[async_trait]
impl Transport for SendGridTransport {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, email: &OutboundEmail) -> Result<TransportReceipt, TransportError> {
        let response = self
            .client
            .post(SEND_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&build_payload(email))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        op: "SendGrid send".into(),
                        timeout: self.timeout,
                    }
                } else {
                    TransportError::SendFailed {
                        provider: PROVIDER.into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %email.to, status = status.as_u16(), "SendGrid accepted message");
        Ok(TransportReceipt {
            status_code: status.as_u16(),
        })
    }
}
