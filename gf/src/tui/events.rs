//! TUI event handling
//!
//! Async-compatible event handling for the TUI using tokio channels.

use std::time::Duration;

use crossterm::event::{self, KeyEvent};
use eyre::Result;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Terminal events
#[derive(Debug)]
pub enum Event {
    /// Key press
    Key(KeyEvent),
    /// Bracketed paste
    Paste(String),
    /// Terminal resize
    Resize(u16, u16),
    /// Tick (periodic refresh)
    Tick,
}

/// Event handler for the TUI
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Create a new event handler with the given tick rate
    pub fn new(tick_rate: Duration) -> Self {
        debug!(?tick_rate, "EventHandler::new: called");
        let (tx, rx) = mpsc::unbounded_channel();

        // crossterm polling blocks, so it gets its own thread
        std::thread::spawn(move || {
            debug!("EventHandler: polling thread started");
            loop {
                let event = if event::poll(tick_rate).unwrap_or(false) {
                    match event::read() {
                        Ok(event::Event::Key(key)) => Event::Key(key),
                        Ok(event::Event::Paste(text)) => Event::Paste(text),
                        Ok(event::Event::Resize(w, h)) => Event::Resize(w, h),
                        Ok(other) => {
                            trace!(?other, "EventHandler: other event, skipping");
                            continue;
                        }
                        Err(e) => {
                            debug!(error = %e, "EventHandler: read failed");
                            continue;
                        }
                    }
                } else {
                    Event::Tick
                };

                if tx.send(event).is_err() {
                    debug!("EventHandler: channel closed, exiting loop");
                    break;
                }
            }
        });

        Self { rx }
    }

    #[cfg(test)]
    fn from_receiver(rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { rx }
    }

    /// Get the next event (async)
    pub async fn next(&mut self) -> Result<Event> {
        self.rx.recv().await.ok_or_else(|| eyre::eyre!("Event channel closed"))
    }

    /// Take every event already queued, without waiting
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        trace!(count = events.len(), "EventHandler::drain: called");
        events
    }
}
