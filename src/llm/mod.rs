//! LLM integration for Agri Assist.
//!
//! Extraction only needs one capability from the model: answer a chat
//! prompt with a JSON object matching a schema. `LlmProvider` abstracts the
//! backend; `structured_output` layers JSON parsing on top.

pub mod provider;
pub mod rig_adapter;
pub mod structured;

pub use provider::*;
pub use rig_adapter::RigAdapter;
pub use structured::{extract_json_object, structured_output};

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create an LLM provider from configuration.
///
/// Without an API key the returned provider reports itself unconfigured.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.api_key {
        Some(ref key) => create_openai_provider(config, key.expose_secret()),
        None => {
            tracing::warn!("OPENAI_API_KEY not set; AI extraction is disabled");
            Ok(Arc::new(DisabledProvider))
        }
    }
}

fn create_openai_provider(
    config: &LlmConfig,
    api_key: &str,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::builder()
            .api_key(api_key)
            .base_url(&config.base_url)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            })?;

    // Extraction relies on chat-completions `response_format`.
    let model = client.completions_api().completion_model(&config.model);
    tracing::info!("Using OpenAI backend (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, "openai")))
}
