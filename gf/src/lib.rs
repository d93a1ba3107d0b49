//! gofigure - plain-language shell planner
//!
//! An operator types a request in plain language; a language model proposes
//! an ordered plan of shell steps; each step is confirmed before it is either
//! executed or appended to a command file. Every query and its plan go into a
//! durable history ledger.
//!
//! # Modules
//!
//! - [`plan`] - Query, step and plan value types
//! - [`history`] - Append-only, persisted history ledger
//! - [`exec`] - Execution gateway and shell collaborator
//! - [`llm`] - Model client trait and OpenAI implementation
//! - [`planner`] - Plan retrieval on top of the model client
//! - [`session`] - Screen state machine and effect driver
//! - [`tui`] - Interactive terminal front end
//! - [`oneshot`] - Line-mode flow for a single query
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod exec;
pub mod history;
pub mod llm;
pub mod oneshot;
pub mod plan;
pub mod planner;
pub mod session;
pub mod tui;

pub use config::Config;
pub use exec::{Dispatched, ExecutionError, Gateway, Mode, ShellOutput, ShellRunner};
pub use history::{HistoryEntry, HistoryLedger};
pub use llm::{LlmClient, LlmError};
pub use plan::{Plan, PlanError, Query, Step};
pub use planner::{LlmPlanner, PlanFetcher};
pub use session::{Controller, Disposition, Msg, Screen, SessionState, StepStatus};
