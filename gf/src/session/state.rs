//! Session state - pure data owned by the session controller
//!
//! Nothing here performs I/O. Views read a `&SessionState`; only the
//! transition function in `machine` mutates it.

use std::fmt;

use crate::exec::Mode;
use crate::plan::{Plan, Query, Step};

/// Words shown while a plan request is outstanding
pub const THINKING_WORDS: &[&str] = &[
    "Pondering",
    "Thinking",
    "Figuring",
    "Planning",
    "Computing",
    "Analyzing",
    "Reasoning",
    "Mulling",
];

/// Which screen is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Menu,
    Query,
    Mode,
    AwaitingPlan,
    Steps,
    Executing,
    Done,
    History,
}

impl Screen {
    pub fn display_name(self) -> &'static str {
        match self {
            Screen::Menu => "Menu",
            Screen::Query => "Query",
            Screen::Mode => "Mode",
            Screen::AwaitingPlan => "Awaiting plan",
            Screen::Steps => "Steps",
            Screen::Executing => "Executing",
            Screen::Done => "Done",
            Screen::History => "History",
        }
    }

    /// Screens that carry an active plan
    pub fn holds_plan(self) -> bool {
        matches!(self, Screen::Steps | Screen::Executing | Screen::Done)
    }
}

/// Identity of one plan request; later requests compare greater
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How one step was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Command ran successfully
    Executed { output: String },
    /// Command appended to the sink
    Written { command: String },
    /// Informational step acknowledged, nothing dispatched
    Acknowledged,
    /// Operator declined the step
    Skipped,
    /// Dispatch failed; later steps still proceed
    Failed { message: String, output: String },
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Executed { .. } => "executed",
            StepStatus::Written { .. } => "written",
            StepStatus::Acknowledged => "noted",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed { .. } => "failed",
        }
    }
}

/// Resolution record for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub number: u32,
    pub status: StepStatus,
}

/// Mutable state of the interactive session
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub screen: Screen,
    /// Raw text being typed on the current screen
    pub input: String,
    pub active_query: Option<Query>,
    pub active_mode: Option<Mode>,
    pub active_plan: Option<Plan>,
    /// The only operator-visible error channel
    pub last_error: Option<String>,
    /// Outstanding plan request, set only on the awaiting screen
    pub pending_request: Option<RequestId>,
    /// Index into the active plan of the step under confirmation
    pub cursor: usize,
    /// Resolutions for steps already confirmed, in plan order
    pub records: Vec<StepRecord>,
    /// Ledger rendering captured when the history screen opened
    pub history_view: String,
    /// Indicator word for the awaiting screen
    pub thinking_word: &'static str,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            thinking_word: THINKING_WORDS[0],
            ..Default::default()
        }
    }

    pub fn is_awaiting_plan(&self) -> bool {
        self.pending_request.is_some()
    }

    /// The step currently offered for confirmation
    pub fn current_step(&self) -> Option<&Step> {
        if !matches!(self.screen, Screen::Steps | Screen::Executing) {
            return None;
        }
        self.active_plan.as_ref().and_then(|p| p.get(self.cursor))
    }

    /// Resolution of the step with this number, if already resolved
    pub fn record_for(&self, number: u32) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.number == number)
    }

    /// Count of records matching a predicate
    pub fn count_records(&self, f: impl Fn(&StepStatus) -> bool) -> usize {
        self.records.iter().filter(|r| f(&r.status)).count()
    }

    pub fn set_error(&mut self, msg: impl Into<String>) {
        self.last_error = Some(msg.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}
