//! LLM client module
//!
//! Provides the provider-agnostic completion trait and the OpenAI
//! Chat Completions implementation used for plan retrieval.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client for the provider named in config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIClient::from_config(config)?)),
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: openai",
                other
            )))
        }
    }
}
