//! rig-core backed `Generator`.

use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::{anthropic, openai};
use secrecy::ExposeSecret;

use crate::config::{GenerationBackend, GenerationConfig};
use crate::error::GenerationError;

use super::{Generator, with_timeout};

/// Sampling temperature for reply drafts.
const TEMPERATURE: f64 = 0.3;

/// Upper bound on reply length; a 120-word reply fits comfortably.
const MAX_TOKENS: u64 = 512;

enum RigClient {
    OpenAi(rig::client::Client<openai::client::OpenAIResponsesExt>),
    Anthropic(rig::client::Client<anthropic::client::AnthropicExt>),
}

pub struct RigGenerator {
    client: RigClient,
    model: String,
    timeout: Duration,
}

impl RigGenerator {
    pub fn new(config: &GenerationConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let key = config.api_key.expose_secret();
        let client = match config.backend {
            GenerationBackend::OpenAi => RigClient::OpenAi(
                openai::Client::new(key).map_err(|e| request_failed("openai", e))?,
            ),
            GenerationBackend::Anthropic => RigClient::Anthropic(
                anthropic::Client::new(key).map_err(|e| request_failed("anthropic", e))?,
            ),
        };
        Ok(Self {
            client,
            model: config.model.clone(),
            timeout,
        })
    }

    fn provider(&self) -> &'static str {
        match self.client {
            RigClient::OpenAi(_) => "openai",
            RigClient::Anthropic(_) => "anthropic",
        }
    }

    async fn prompt(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String> {
        match &self.client {
            RigClient::OpenAi(client) => client
                .agent(self.model.as_str())
                .preamble(system_prompt)
                .temperature(TEMPERATURE)
                .max_tokens(MAX_TOKENS)
                .build()
                .prompt(user_prompt)
                .await
                .map_err(|e| e.to_string()),
            RigClient::Anthropic(client) => client
                .agent(self.model.as_str())
                .preamble(system_prompt)
                .temperature(TEMPERATURE)
                .max_tokens(MAX_TOKENS)
                .build()
                .prompt(user_prompt)
                .await
                .map_err(|e| e.to_string()),
        }
    }
}

fn request_failed(provider: &str, reason: impl std::fmt::Display) -> GenerationError {
    GenerationError::RequestFailed {
        provider: provider.to_string(),
        reason: format!("Failed to create client: {reason}"),
    }
}

#[async_trait]
impl Generator for RigGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError> {
        let request = async {
            self.prompt(system_prompt, user_prompt)
                .await
                .map_err(|reason| GenerationError::RequestFailed {
                    provider: self.provider().to_string(),
                    reason,
                })
        };
        let text = with_timeout(self.timeout, request).await?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::Unusable {
                provider: self.provider().to_string(),
                reason: "empty completion".into(),
            });
        }
        Ok(text)
    }
}
