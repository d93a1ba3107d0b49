//! Effect driver for the session
//!
//! Owns the collaborators and carries out the `Effect`s that
//! `Session::update` returns. Plan requests run as background tokio tasks and
//! report back through a channel; step dispatch is awaited in the foreground
//! so the next step is never offered before the previous one finishes.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::machine::{Effect, Msg, Session};
use super::state::SessionState;
use crate::exec::{Gateway, Mode};
use crate::history::HistoryLedger;
use crate::planner::PlanFetcher;
use crate::plan::Step;

/// Session plus the collaborators its effects need
pub struct Controller {
    session: Session,
    planner: Arc<dyn PlanFetcher>,
    gateway: Gateway,
    sink: Box<dyn Write + Send>,
    plan_tx: mpsc::UnboundedSender<Msg>,
    plan_rx: mpsc::UnboundedReceiver<Msg>,
    /// Background plan request, present while one is outstanding
    plan_task: Option<JoinHandle<()>>,
    /// Approved step waiting to be dispatched
    pending_dispatch: Option<(Mode, Step)>,
}

impl Controller {
    pub fn new(
        ledger: Arc<HistoryLedger>,
        planner: Arc<dyn PlanFetcher>,
        gateway: Gateway,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        debug!("Controller::new: called");
        let (plan_tx, plan_rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(ledger),
            planner,
            gateway,
            sink,
            plan_tx,
            plan_rx,
            plan_task: None,
            pending_dispatch: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn ledger(&self) -> &Arc<HistoryLedger> {
        self.session.ledger()
    }

    /// Deliver one message; returns true when the session asked to quit
    ///
    /// Must be called from within a tokio runtime: plan requests are spawned.
    pub fn handle(&mut self, msg: Msg) -> bool {
        let Some(effect) = self.session.update(msg) else {
            return false;
        };
        debug!(?effect, "Controller::handle: effect");

        match effect {
            Effect::FetchPlan { request, query } => {
                self.abort_plan_task();
                let planner = self.planner.clone();
                let tx = self.plan_tx.clone();
                self.plan_task = Some(tokio::spawn(async move {
                    let result = planner.fetch_plan(&query).await;
                    if tx.send(Msg::PlanArrived { request, result }).is_err() {
                        debug!(%request, "Controller: receiver gone, dropping plan");
                    }
                }));
                false
            }
            Effect::AbandonPlan { request } => {
                info!(%request, "Abandoning plan request");
                self.abort_plan_task();
                false
            }
            Effect::Dispatch { mode, step } => {
                self.pending_dispatch = Some((mode, step));
                false
            }
            Effect::Quit => {
                self.abort_plan_task();
                true
            }
        }
    }

    pub fn has_pending_dispatch(&self) -> bool {
        self.pending_dispatch.is_some()
    }

    /// Dispatch the approved step and feed its result back in
    pub async fn run_pending_dispatch(&mut self) -> bool {
        let Some((mode, step)) = self.pending_dispatch.take() else {
            return false;
        };
        debug!(%mode, step = step.number, "Controller::run_pending_dispatch: called");

        let result = self.gateway.dispatch(mode, &step, self.sink.as_mut()).await;
        if let Err(e) = &result {
            warn!(step = step.number, error = %e, "Step dispatch failed");
        }
        self.handle(Msg::StepFinished {
            number: step.number,
            result,
        })
    }

    /// Wait for the next plan result
    ///
    /// Pends forever when no request is outstanding, so it can sit in a
    /// `select!` next to the input source.
    pub async fn next_plan_message(&mut self) -> Msg {
        match self.plan_rx.recv().await {
            Some(msg) => msg,
            // The controller holds a sender, so the channel never closes
            None => std::future::pending().await,
        }
    }

    /// Run background work until the session needs the operator again
    ///
    /// Returns true when the session asked to quit.
    pub async fn settle(&mut self) -> bool {
        loop {
            if self.has_pending_dispatch() {
                if self.run_pending_dispatch().await {
                    return true;
                }
            } else if self.state().is_awaiting_plan() {
                let msg = self.next_plan_message().await;
                if self.handle(msg) {
                    return true;
                }
            } else {
                return false;
            }
        }
    }

    fn abort_plan_task(&mut self) {
        if let Some(task) = self.plan_task.take() {
            debug!("Controller::abort_plan_task: aborting");
            task.abort();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.abort_plan_task();
    }
}
