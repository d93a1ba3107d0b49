//! LLM request/response types

use serde::{Deserialize, Serialize};

/// A completion request - everything needed for one model call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt
    pub system_prompt: String,

    /// Conversation messages (one user message for plan retrieval)
    pub messages: Vec<Message>,

    /// Max tokens for the response
    pub max_tokens: u32,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
        }
    }
}

/// Response from a completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Text content (if any)
    pub content: Option<String>,

    /// Why the model stopped
    pub stop_reason: StopReason,

    /// Token accounting
    pub usage: TokenUsage,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
}

/// Token usage for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
