//! Session transition function
//!
//! Every input event and every collaborator result arrives as a `Msg`.
//! `Session::update` applies it to the state and returns at most one
//! `Effect` for the driver to carry out. The only side effect performed here
//! is appending to the history ledger when a plan arrives.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use tracing::{debug, info};

use super::state::{RequestId, Screen, SessionState, StepRecord, StepStatus, THINKING_WORDS};
use crate::exec::{Dispatched, ExecutionError, Mode};
use crate::history::HistoryLedger;
use crate::plan::{Plan, PlanError, Query, Step};

/// Operator decision for the step under confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Dispatch the step (or acknowledge it when it has no command)
    Approve,
    /// Leave the step undone and move on
    Skip,
    /// Abandon the remaining steps and go back to query entry
    Cancel,
}

/// Messages delivered to the session
#[derive(Debug)]
pub enum Msg {
    /// A typed character
    Char(char),
    /// A block of text (bracketed paste, scripted input)
    Paste(String),
    Backspace,
    Submit,
    /// Esc: go back, or cancel what is in progress
    Back,
    Quit,
    Confirm(Disposition),
    /// Result of a plan request
    PlanArrived {
        request: RequestId,
        result: Result<Plan, PlanError>,
    },
    /// Result of dispatching the step under confirmation
    StepFinished {
        number: u32,
        result: Result<Dispatched, ExecutionError>,
    },
}

/// Work the driver must perform after an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start a background plan request
    FetchPlan { request: RequestId, query: Query },
    /// Drop an outstanding plan request; its result will be ignored
    AbandonPlan { request: RequestId },
    /// Dispatch a step and report back with `Msg::StepFinished`
    Dispatch { mode: Mode, step: Step },
    /// Exit the process
    Quit,
}

/// Session controller state machine
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    ledger: Arc<HistoryLedger>,
    last_request: u64,
}

impl Session {
    pub fn new(ledger: Arc<HistoryLedger>) -> Self {
        debug!("Session::new: called");
        Self {
            state: SessionState::new(),
            ledger,
            last_request: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn ledger(&self) -> &Arc<HistoryLedger> {
        &self.ledger
    }

    /// Apply one message
    pub fn update(&mut self, msg: Msg) -> Option<Effect> {
        debug!(screen = ?self.state.screen, ?msg, "Session::update: called");
        if let Msg::Quit = msg {
            info!("Quit requested");
            return Some(Effect::Quit);
        }

        match self.state.screen {
            Screen::Menu => self.on_menu(msg),
            Screen::History => self.on_history(msg),
            Screen::Query => self.on_query(msg),
            Screen::Mode => self.on_mode(msg),
            Screen::AwaitingPlan => self.on_awaiting(msg),
            Screen::Steps => self.on_steps(msg),
            Screen::Executing => self.on_executing(msg),
            Screen::Done => self.on_done(msg),
        }
    }

    /// Move to `screen`, clearing the error line
    fn go(&mut self, screen: Screen) {
        debug!(from = ?self.state.screen, to = ?screen, "Session::go: transition");
        self.state.screen = screen;
        self.state.clear_error();
        if !screen.holds_plan() {
            self.state.active_plan = None;
            self.state.cursor = 0;
            self.state.records.clear();
        }
    }

    /// Fresh query entry with an empty buffer
    fn restart_query(&mut self) {
        self.state.input.clear();
        self.state.active_query = None;
        self.state.active_mode = None;
        self.go(Screen::Query);
    }

    /// Shared text editing for the typing screens; returns the message back
    /// when it is not an edit
    fn edit_input(&mut self, msg: Msg) -> Option<Msg> {
        match msg {
            Msg::Char(c) => self.state.input.push(c),
            Msg::Paste(text) => self.state.input.push_str(&text),
            Msg::Backspace => {
                self.state.input.pop();
            }
            other => return Some(other),
        }
        None
    }

    fn on_menu(&mut self, msg: Msg) -> Option<Effect> {
        match self.edit_input(msg)? {
            Msg::Submit => {
                let choice = std::mem::take(&mut self.state.input);
                match choice.trim().to_lowercase().as_str() {
                    "query" | "1" => self.restart_query(),
                    "history" | "2" => {
                        self.state.history_view = self.ledger.render();
                        self.go(Screen::History);
                    }
                    _ => self.state.set_error("invalid selection"),
                }
            }
            Msg::Back => self.state.input.clear(),
            other => ignore(&other),
        }
        None
    }

    fn on_history(&mut self, msg: Msg) -> Option<Effect> {
        match msg {
            Msg::Back | Msg::Submit | Msg::Char('q') => {
                self.state.input.clear();
                self.go(Screen::Menu);
            }
            other => ignore(&other),
        }
        None
    }

    fn on_query(&mut self, msg: Msg) -> Option<Effect> {
        match self.edit_input(msg)? {
            Msg::Submit => match Query::new(&self.state.input) {
                Ok(query) => {
                    info!(%query, "Query accepted");
                    self.state.active_query = Some(query);
                    self.state.input.clear();
                    self.go(Screen::Mode);
                }
                Err(_) => self.state.set_error("empty query"),
            },
            Msg::Back => {
                self.state.input.clear();
                self.go(Screen::Menu);
            }
            other => ignore(&other),
        }
        None
    }

    fn on_mode(&mut self, msg: Msg) -> Option<Effect> {
        match self.edit_input(msg)? {
            Msg::Submit => {
                let Ok(mode) = self.state.input.parse::<Mode>() else {
                    self.state.set_error("invalid mode");
                    return None;
                };
                let Some(query) = self.state.active_query.clone() else {
                    // Mode is only reachable with a query; recover by asking again
                    self.restart_query();
                    return None;
                };

                self.last_request += 1;
                let request = RequestId(self.last_request);
                info!(%mode, %request, "Requesting plan");

                self.state.active_mode = Some(mode);
                self.state.input.clear();
                self.state.pending_request = Some(request);
                self.state.thinking_word = THINKING_WORDS.choose(&mut rand::rng()).copied().unwrap_or("Thinking");
                self.go(Screen::AwaitingPlan);
                Some(Effect::FetchPlan { request, query })
            }
            Msg::Back => {
                self.restart_query();
                None
            }
            other => {
                ignore(&other);
                None
            }
        }
    }

    fn on_awaiting(&mut self, msg: Msg) -> Option<Effect> {
        match msg {
            Msg::Back => {
                let request = self.state.pending_request.take()?;
                info!(%request, "Plan request cancelled");
                self.restart_query();
                Some(Effect::AbandonPlan { request })
            }
            Msg::PlanArrived { request, result } => {
                if self.state.pending_request != Some(request) {
                    debug!(%request, "Session::on_awaiting: discarding stale plan");
                    return None;
                }
                self.state.pending_request = None;
                self.accept_plan(result);
                None
            }
            other => {
                ignore(&other);
                None
            }
        }
    }

    fn accept_plan(&mut self, result: Result<Plan, PlanError>) {
        match result {
            Ok(plan) if plan.is_empty() => {
                info!("Plan has no steps");
                self.state.input.clear();
                self.go(Screen::Query);
                self.state.set_error("no steps found");
            }
            Ok(plan) => {
                info!(steps = plan.len(), "Plan accepted");
                if let Some(query) = self.state.active_query.clone() {
                    self.ledger.append(query, &plan);
                }
                self.go(Screen::Steps);
                self.state.active_plan = Some(plan);
                self.state.cursor = 0;
                self.state.records.clear();
            }
            Err(e) => {
                info!(error = %e, "Plan retrieval failed");
                self.state.input.clear();
                self.go(Screen::Query);
                self.state.set_error(e.to_string());
            }
        }
    }

    fn on_steps(&mut self, msg: Msg) -> Option<Effect> {
        let disposition = match msg {
            Msg::Confirm(d) => d,
            Msg::Submit => Disposition::Approve,
            Msg::Back => Disposition::Cancel,
            other => {
                ignore(&other);
                return None;
            }
        };

        let step = self.state.current_step()?.clone();
        match disposition {
            Disposition::Approve => match (step.runnable_command().is_some(), self.state.active_mode) {
                (true, Some(mode)) => {
                    self.go(Screen::Executing);
                    return Some(Effect::Dispatch { mode, step });
                }
                _ => self.resolve(step.number, StepStatus::Acknowledged),
            },
            Disposition::Skip => self.resolve(step.number, StepStatus::Skipped),
            Disposition::Cancel => {
                info!(step = step.number, "Remaining steps cancelled");
                self.restart_query();
            }
        }
        None
    }

    fn on_executing(&mut self, msg: Msg) -> Option<Effect> {
        match msg {
            Msg::StepFinished { number, result } => {
                if self.state.current_step().map(|s| s.number) != Some(number) {
                    debug!(number, "Session::on_executing: result for another step, ignoring");
                    return None;
                }
                let status = match result {
                    Ok(Dispatched::Executed { output }) => StepStatus::Executed { output },
                    Ok(Dispatched::Written { command }) => StepStatus::Written { command },
                    Err(ExecutionError::CommandFailed { message, output }) => StepStatus::Failed { message, output },
                    Err(e) => StepStatus::Failed {
                        message: e.to_string(),
                        output: String::new(),
                    },
                };
                self.resolve(number, status);
            }
            other => ignore(&other),
        }
        None
    }

    fn on_done(&mut self, msg: Msg) -> Option<Effect> {
        match msg {
            Msg::Submit => self.restart_query(),
            Msg::Back | Msg::Char('q') => {
                self.state.input.clear();
                self.go(Screen::Menu);
            }
            other => ignore(&other),
        }
        None
    }

    /// Record a step's resolution and offer the next one
    fn resolve(&mut self, number: u32, status: StepStatus) {
        debug!(number, status = status.label(), "Session::resolve: called");
        self.state.records.push(StepRecord { number, status });
        self.state.cursor += 1;
        let remaining = self
            .state
            .active_plan
            .as_ref()
            .is_some_and(|p| self.state.cursor < p.len());
        self.go(if remaining { Screen::Steps } else { Screen::Done });
    }
}

fn ignore(msg: &Msg) {
    debug!(?msg, "Session: input ignored on this screen");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    fn session() -> Session {
        Session::new(Arc::new(HistoryLedger::in_memory()))
    }

    fn type_and_submit(session: &mut Session, text: &str) -> Option<Effect> {
        session.update(Msg::Paste(text.to_string()));
        session.update(Msg::Submit)
    }

    /// Drive a fresh session to the awaiting screen and return the request id
    fn to_awaiting(session: &mut Session, query: &str, mode: &str) -> RequestId {
        type_and_submit(session, "query");
        type_and_submit(session, query);
        match type_and_submit(session, mode) {
            Some(Effect::FetchPlan { request, .. }) => request,
            other => panic!("expected FetchPlan, got {:?}", other),
        }
    }

    fn plan(steps: Vec<Step>) -> Plan {
        Plan::new(steps).unwrap()
    }

    fn two_step_plan() -> Plan {
        plan(vec![
            Step::new(1, "make file", "", Some("touch a.txt")),
            Step::new(2, "list files", "", Some("ls")),
        ])
    }

    #[test]
    fn test_menu_selects_query_and_history() {
        let mut s = session();
        type_and_submit(&mut s, "Query");
        assert_eq!(s.state().screen, Screen::Query);

        s.update(Msg::Back);
        assert_eq!(s.state().screen, Screen::Menu);

        type_and_submit(&mut s, "history");
        assert_eq!(s.state().screen, Screen::History);
        assert_eq!(s.state().history_view, "No history available.");

        s.update(Msg::Back);
        assert_eq!(s.state().screen, Screen::Menu);
    }

    #[test]
    fn test_menu_invalid_selection() {
        let mut s = session();
        type_and_submit(&mut s, "bogus");
        assert_eq!(s.state().screen, Screen::Menu);
        assert_eq!(s.state().last_error.as_deref(), Some("invalid selection"));
        assert!(s.state().input.is_empty());
    }

    #[test]
    fn test_empty_query_stays_on_query() {
        let mut s = session();
        type_and_submit(&mut s, "query");
        s.update(Msg::Submit);

        assert_eq!(s.state().screen, Screen::Query);
        assert_eq!(s.state().last_error.as_deref(), Some("empty query"));

        // Successful transition clears the error
        type_and_submit(&mut s, "list files");
        assert_eq!(s.state().screen, Screen::Mode);
        assert!(s.state().last_error.is_none());
        assert_eq!(s.state().active_query.as_ref().unwrap().as_str(), "list files");
    }

    #[test]
    fn test_backspace_edits_buffer() {
        let mut s = session();
        type_and_submit(&mut s, "query");
        s.update(Msg::Char('l'));
        s.update(Msg::Char('x'));
        s.update(Msg::Backspace);
        s.update(Msg::Char('s'));
        assert_eq!(s.state().input, "ls");
    }

    #[test]
    fn test_invalid_mode_stays_on_mode() {
        let mut s = session();
        type_and_submit(&mut s, "query");
        type_and_submit(&mut s, "list files");
        let effect = type_and_submit(&mut s, "launch");

        assert!(effect.is_none());
        assert_eq!(s.state().screen, Screen::Mode);
        assert_eq!(s.state().last_error.as_deref(), Some("invalid mode"));
    }

    #[test]
    fn test_mode_submit_issues_fetch() {
        let mut s = session();
        type_and_submit(&mut s, "query");
        type_and_submit(&mut s, "list files");
        let effect = type_and_submit(&mut s, "execute");

        assert_eq!(
            effect,
            Some(Effect::FetchPlan {
                request: RequestId(1),
                query: Query::new("list files").unwrap(),
            })
        );
        assert_eq!(s.state().screen, Screen::AwaitingPlan);
        assert!(s.state().is_awaiting_plan());
        assert_eq!(s.state().active_mode, Some(Mode::Execute));
    }

    #[test]
    fn test_input_ignored_while_awaiting() {
        let mut s = session();
        to_awaiting(&mut s, "list files", "execute");

        assert!(s.update(Msg::Char('x')).is_none());
        assert!(s.update(Msg::Submit).is_none());
        assert!(s.update(Msg::Confirm(Disposition::Approve)).is_none());
        assert_eq!(s.state().screen, Screen::AwaitingPlan);
        assert!(s.state().input.is_empty());
    }

    #[test]
    fn test_plan_arrival_moves_to_steps_and_records_history() {
        let mut s = session();
        let request = to_awaiting(&mut s, "list files", "execute");
        let p = plan(vec![Step::new(1, "list files", "show contents", Some("ls"))]);

        s.update(Msg::PlanArrived {
            request,
            result: Ok(p.clone()),
        });

        assert_eq!(s.state().screen, Screen::Steps);
        assert_eq!(s.state().active_plan.as_ref(), Some(&p));
        assert!(!s.state().is_awaiting_plan());
        let entries = s.ledger().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].query.as_str(), "list files");
        assert_eq!(entries[0].response, p.steps().to_vec());
    }

    #[test]
    fn test_empty_plan_returns_to_query() {
        let mut s = session();
        let request = to_awaiting(&mut s, "noop", "execute");

        s.update(Msg::PlanArrived {
            request,
            result: Ok(Plan::empty()),
        });

        assert_eq!(s.state().screen, Screen::Query);
        assert_eq!(s.state().last_error.as_deref(), Some("no steps found"));
        assert!(s.state().active_plan.is_none());
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn test_retrieval_failure_returns_to_query() {
        let mut s = session();
        let request = to_awaiting(&mut s, "list files", "execute");

        s.update(Msg::PlanArrived {
            request,
            result: Err(PlanError::Retrieval(LlmError::InvalidResponse("bad gateway".to_string()))),
        });

        let state = s.state();
        assert_eq!(state.screen, Screen::Query);
        assert!(state.active_plan.is_none());
        assert!(!state.is_awaiting_plan());
        assert!(state.last_error.as_ref().unwrap().contains("bad gateway"));
    }

    #[test]
    fn test_cancel_while_awaiting_discards_late_result() {
        let mut s = session();
        let request = to_awaiting(&mut s, "list files", "execute");

        assert_eq!(s.update(Msg::Back), Some(Effect::AbandonPlan { request }));
        assert_eq!(s.state().screen, Screen::Query);

        s.update(Msg::PlanArrived {
            request,
            result: Ok(two_step_plan()),
        });
        assert_eq!(s.state().screen, Screen::Query);
        assert!(s.state().active_plan.is_none());
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn test_stale_result_does_not_clobber_newer_request() {
        let mut s = session();
        let first = to_awaiting(&mut s, "first", "execute");
        s.update(Msg::Back);

        type_and_submit(&mut s, "second");
        let second = match type_and_submit(&mut s, "execute") {
            Some(Effect::FetchPlan { request, .. }) => request,
            other => panic!("expected FetchPlan, got {:?}", other),
        };
        assert!(second > first);

        s.update(Msg::PlanArrived {
            request: first,
            result: Ok(two_step_plan()),
        });
        assert_eq!(s.state().screen, Screen::AwaitingPlan);

        s.update(Msg::PlanArrived {
            request: second,
            result: Ok(two_step_plan()),
        });
        assert_eq!(s.state().screen, Screen::Steps);
        assert_eq!(s.ledger().entries()[0].query.as_str(), "second");
    }

    #[test]
    fn test_approve_dispatches_then_advances() {
        let mut s = session();
        let request = to_awaiting(&mut s, "files", "execute");
        s.update(Msg::PlanArrived {
            request,
            result: Ok(two_step_plan()),
        });

        let effect = s.update(Msg::Confirm(Disposition::Approve));
        assert_eq!(
            effect,
            Some(Effect::Dispatch {
                mode: Mode::Execute,
                step: Step::new(1, "make file", "", Some("touch a.txt")),
            })
        );
        assert_eq!(s.state().screen, Screen::Executing);

        // Nothing else is accepted until the step finishes
        assert!(s.update(Msg::Confirm(Disposition::Approve)).is_none());
        assert_eq!(s.state().screen, Screen::Executing);

        s.update(Msg::StepFinished {
            number: 1,
            result: Ok(Dispatched::Executed { output: String::new() }),
        });
        assert_eq!(s.state().screen, Screen::Steps);
        assert_eq!(s.state().current_step().unwrap().number, 2);
    }

    #[test]
    fn test_informational_step_is_acknowledged_without_dispatch() {
        let mut s = session();
        let request = to_awaiting(&mut s, "explain", "execute");
        s.update(Msg::PlanArrived {
            request,
            result: Ok(plan(vec![Step::new(1, "read the docs", "context", None)])),
        });

        assert!(s.update(Msg::Confirm(Disposition::Approve)).is_none());
        assert_eq!(s.state().screen, Screen::Done);
        assert_eq!(s.state().records[0].status, StepStatus::Acknowledged);
    }

    #[test]
    fn test_failed_step_does_not_block_next() {
        let mut s = session();
        let request = to_awaiting(&mut s, "files", "execute");
        s.update(Msg::PlanArrived {
            request,
            result: Ok(two_step_plan()),
        });

        s.update(Msg::Confirm(Disposition::Approve));
        s.update(Msg::StepFinished {
            number: 1,
            result: Err(ExecutionError::CommandFailed {
                message: "Exit code: 1".to_string(),
                output: "denied".to_string(),
            }),
        });

        assert_eq!(s.state().screen, Screen::Steps);
        assert_eq!(s.state().records[0].status.label(), "failed");
        assert_eq!(s.state().current_step().unwrap().number, 2);
    }

    #[test]
    fn test_skip_all_reaches_done() {
        let mut s = session();
        let request = to_awaiting(&mut s, "files", "write-to-file");
        s.update(Msg::PlanArrived {
            request,
            result: Ok(two_step_plan()),
        });

        s.update(Msg::Confirm(Disposition::Skip));
        s.update(Msg::Confirm(Disposition::Skip));

        assert_eq!(s.state().screen, Screen::Done);
        assert!(s.state().active_plan.is_some());
        assert_eq!(s.state().count_records(|st| *st == StepStatus::Skipped), 2);

        s.update(Msg::Submit);
        assert_eq!(s.state().screen, Screen::Query);
        assert!(s.state().active_plan.is_none());
        assert!(s.state().input.is_empty());
    }

    #[test]
    fn test_cancel_mid_confirmation_returns_to_query() {
        let mut s = session();
        let request = to_awaiting(&mut s, "files", "execute");
        s.update(Msg::PlanArrived {
            request,
            result: Ok(two_step_plan()),
        });

        s.update(Msg::Confirm(Disposition::Skip));
        let effect = s.update(Msg::Confirm(Disposition::Cancel));

        assert!(effect.is_none());
        let state = s.state();
        assert_eq!(state.screen, Screen::Query);
        assert!(state.active_plan.is_none());
        assert!(state.records.is_empty());
        assert!(state.last_error.is_none());
        assert!(state.active_query.is_none());
    }

    #[test]
    fn test_quit_from_any_screen() {
        let mut s = session();
        assert_eq!(s.update(Msg::Quit), Some(Effect::Quit));

        to_awaiting(&mut s, "files", "execute");
        assert_eq!(s.update(Msg::Quit), Some(Effect::Quit));
    }

    #[test]
    fn test_done_back_goes_to_menu() {
        let mut s = session();
        let request = to_awaiting(&mut s, "files", "execute");
        s.update(Msg::PlanArrived {
            request,
            result: Ok(plan(vec![Step::new(1, "note", "", None)])),
        });
        s.update(Msg::Submit);
        assert_eq!(s.state().screen, Screen::Done);

        s.update(Msg::Back);
        assert_eq!(s.state().screen, Screen::Menu);
        assert!(s.state().active_plan.is_none());
    }
}
