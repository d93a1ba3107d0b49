//! Plan retrieval - turns a query into a validated plan via the model
//!
//! The reply is expected to be JSON, either `{"steps": [...]}` or a bare
//! array of steps. Anything that does not parse into a valid plan comes back
//! as `PlanError::Malformed`, never a panic.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::llm::{CompletionRequest, LlmClient, Message, StopReason};
use crate::plan::{Plan, PlanError, Query, Step};

const SYSTEM_PROMPT: &str =
    "You are an AI assistant helping with Linux commands, returning structured JSON responses.";

/// Source of plans for the session controller
#[async_trait]
pub trait PlanFetcher: Send + Sync {
    /// Retrieve a plan for one query; a single attempt
    async fn fetch_plan(&self, query: &Query) -> Result<Plan, PlanError>;
}

/// Plan fetcher backed by an LLM client
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        debug!(max_tokens, "LlmPlanner::new: called");
        Self { llm, max_tokens }
    }

    fn build_prompt(query: &Query) -> String {
        format!(
            r#"You are a Linux command assistant. Given the user's input, respond with a series of steps in JSON format.
Each step should include the step number, a description of the action, the reason for the action, and the command to execute if applicable.
If no command is needed, omit the "command" field. If nothing needs to be done, return an empty list of steps.

Respond ONLY with a JSON object of the form:
{{"steps": [{{"step": 1, "description": "...", "reason": "...", "command": "..."}}]}}

Example:
User input: "Create a file and write 'Hello World' into it."
Response:
{{"steps": [
  {{"step": 1, "description": "Create a new file named 'hello.txt'", "reason": "To store the message", "command": "touch hello.txt"}},
  {{"step": 2, "description": "Write 'Hello World' into the file", "reason": "To add the content to the file", "command": "echo 'Hello World' > hello.txt"}}
]}}

User input: {}"#,
            query
        )
    }
}

#[async_trait]
impl PlanFetcher for LlmPlanner {
    async fn fetch_plan(&self, query: &Query) -> Result<Plan, PlanError> {
        debug!(%query, "LlmPlanner::fetch_plan: called");
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(Self::build_prompt(query))],
            max_tokens: self.max_tokens,
        };

        let response = self.llm.complete(request).await?;
        let usage = response.usage;
        let truncated = response.stop_reason == StopReason::MaxTokens;
        let content = response
            .content
            .ok_or_else(|| PlanError::Malformed("model returned no content".to_string()))?;

        match parse_plan(&content) {
            Ok(plan) => {
                info!(
                    steps = plan.len(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Plan received"
                );
                Ok(plan)
            }
            Err(e) => {
                warn!(error = %e, truncated, raw = %content, "Failed to parse plan");
                if truncated {
                    return Err(PlanError::Malformed(format!(
                        "reply truncated at {} tokens; raise llm.max-tokens",
                        self.max_tokens
                    )));
                }
                Err(e)
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanReply {
    Wrapped { steps: Vec<Step> },
    Bare(Vec<Step>),
}

/// Parse a model reply into a validated plan
pub fn parse_plan(content: &str) -> Result<Plan, PlanError> {
    let json = strip_code_fence(content);
    let reply: PlanReply =
        serde_json::from_str(json).map_err(|e| PlanError::Malformed(format!("invalid plan JSON: {}", e)))?;
    let steps = match reply {
        PlanReply::Wrapped { steps } => steps,
        PlanReply::Bare(steps) => steps,
    };
    Plan::new(steps)
}

/// Remove a surrounding ```json ... ``` fence if the model added one
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
