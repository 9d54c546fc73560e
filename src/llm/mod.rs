//! Text generation for automated replies.
//!
//! Supports:
//! - **OpenAI**: Direct API access via rig-core
//! - **Anthropic**: Direct API access via rig-core
//!
//! `RigGenerator` bridges rig's agent API to the crate's `Generator` trait.

mod rig_adapter;

pub use rig_adapter::RigGenerator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// Stateless completion: one system prompt plus one user prompt in, text out.
/// No conversation memory is kept between calls.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError>;
}

/// Bound one completion call by `timeout`. Expiry becomes
/// `GenerationError::Timeout`.
pub async fn with_timeout<F>(timeout: Duration, completion: F) -> Result<String, GenerationError>
where
    F: Future<Output = Result<String, GenerationError>>,
{
    tokio::time::timeout(timeout, completion)
        .await
        .map_err(|_| GenerationError::Timeout { timeout })?
}

/// Create a generator from configuration.
pub fn create_generator(
    config: &GenerationConfig,
    timeout: Duration,
) -> Result<Arc<dyn Generator>, GenerationError> {
    let generator = RigGenerator::new(config, timeout)?;
    tracing::info!("Using {:?} (model: {})", config.backend, config.model);
    Ok(Arc::new(generator))
}
