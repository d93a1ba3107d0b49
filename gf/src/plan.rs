//! Plan store - the query, step and plan value types
//!
//! These are plain values. The only behavior is construction-time validation:
//! a plan whose steps carry a zero or repeated step number is rejected as
//! malformed so the session controller can treat it as a retrieval failure.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::llm::LlmError;

/// Errors raised while building or retrieving a plan
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("empty query")]
    EmptyQuery,

    #[error("malformed plan: {0}")]
    Malformed(String),

    #[error("plan retrieval failed: {0}")]
    Retrieval(#[from] LlmError),
}

/// Operator-provided request text, never empty once constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Query(String);

impl Query {
    /// Build a query from raw input, trimming surrounding whitespace
    pub fn new(text: impl AsRef<str>) -> Result<Self, PlanError> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            debug!("Query::new: rejected empty input");
            return Err(PlanError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Query {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Query> for String {
    fn from(query: Query) -> Self {
        query.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One proposed action in a plan
///
/// Field names follow the persisted history format:
/// `{"step": 1, "description": "...", "reason": "...", "command": "ls"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Position in the plan, positive and unique
    #[serde(rename = "step", alias = "step number", alias = "step_number")]
    pub number: u32,

    /// What the step does
    pub description: String,

    /// Why the step is needed (may be empty)
    #[serde(rename = "reason", default)]
    pub rationale: String,

    /// Shell command to run; `None` marks an informational step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Step {
    pub fn new(
        number: u32,
        description: impl Into<String>,
        rationale: impl Into<String>,
        command: Option<&str>,
    ) -> Self {
        Self {
            number,
            description: description.into(),
            rationale: rationale.into(),
            command: command.map(str::to_string),
        }
    }

    /// The command to dispatch, if this step has one
    pub fn runnable_command(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Ordered steps produced for one query
///
/// An empty plan is valid and means "nothing actionable".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Validate and build a plan
    ///
    /// Steps are returned in ascending step-number order. Blank commands are
    /// normalized to `None`.
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        debug!(step_count = steps.len(), "Plan::new: called");
        let mut seen = HashSet::new();
        for step in &steps {
            if step.number == 0 {
                return Err(PlanError::Malformed("step number must be positive".to_string()));
            }
            if !seen.insert(step.number) {
                return Err(PlanError::Malformed(format!("duplicate step number {}", step.number)));
            }
            if step.description.trim().is_empty() {
                return Err(PlanError::Malformed(format!("step {} has no description", step.number)));
            }
        }

        let mut steps: Vec<Step> = steps
            .into_iter()
            .map(|mut step| {
                if step.runnable_command().is_none() {
                    step.command = None;
                }
                step
            })
            .collect();
        steps.sort_by_key(|s| s.number);

        Ok(Self { steps })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
