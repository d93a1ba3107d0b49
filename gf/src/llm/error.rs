//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the model provider
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing credential: set the {0} environment variable")]
    MissingCredential(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
