//! TUI Runner - main loop that owns the terminal and drives the controller
//!
//! Each pass draws the current state, then either runs an approved step
//! (input is not read while a step runs, and anything typed meanwhile is
//! dropped apart from Ctrl+C) or waits for whichever comes first: a terminal
//! event or a plan result.

use std::time::Duration;

use eyre::Result;
use tracing::{debug, info};

use super::Tui;
use super::app::map_key;
use super::events::{Event, EventHandler};
use super::views;
use crate::session::{Controller, Msg, Screen};

/// ~30 FPS, also drives the awaiting spinner
const TICK_RATE: Duration = Duration::from_millis(33);

/// TUI Runner that manages the terminal and event loop
pub struct TuiRunner {
    controller: Controller,
    terminal: Tui,
    event_handler: EventHandler,
    /// Frame counter for the awaiting indicator
    ticks: u64,
}

impl TuiRunner {
    pub fn new(terminal: Tui, controller: Controller) -> Self {
        debug!("TuiRunner::new: called");
        Self {
            controller,
            terminal,
            event_handler: EventHandler::new(TICK_RATE),
            ticks: 0,
        }
    }

    /// Run until the operator quits
    pub async fn run(&mut self) -> Result<()> {
        debug!("TuiRunner::run: entering main loop");
        loop {
            let ticks = self.ticks;
            self.terminal
                .draw(|frame| views::render(self.controller.state(), ticks, frame))?;

            // Executing screen is on screen now; run the step before reading input
            if self.controller.has_pending_dispatch() {
                if self.controller.run_pending_dispatch().await {
                    break;
                }
                // Keys pressed while the step ran answer nothing; the next step is not on screen yet
                if quit_requested(self.event_handler.drain()) && self.controller.handle(Msg::Quit) {
                    break;
                }
                continue;
            }

            let quit = tokio::select! {
                event = self.event_handler.next() => self.handle_event(event?),
                msg = self.controller.next_plan_message() => self.controller.handle(msg),
            };
            if quit {
                break;
            }
        }

        info!("TUI exiting");
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Tick => {
                self.ticks = self.ticks.wrapping_add(1);
                false
            }
            Event::Key(key) => match map_key(self.controller.state().screen, key) {
                Some(msg) => self.controller.handle(msg),
                None => false,
            },
            Event::Paste(text) => {
                // Newlines would otherwise submit half a query
                let text = text.replace(['\r', '\n'], " ");
                self.controller.handle(Msg::Paste(text))
            }
            Event::Resize(width, height) => {
                debug!(width, height, "TuiRunner::handle_event: resize");
                false
            }
        }
    }
}

/// Whether input queued during a step asks to quit
///
/// Keys are judged as if pressed on the Executing screen, where only Ctrl+C
/// means anything.
fn quit_requested(events: Vec<Event>) -> bool {
    let dropped = events.len();
    let quit = events.into_iter().any(|event| match event {
        Event::Key(key) => matches!(map_key(Screen::Executing, key), Some(Msg::Quit)),
        _ => false,
    });
    debug!(dropped, quit, "quit_requested: discarded input queued during step");
    quit
}
