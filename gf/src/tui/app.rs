//! Key bindings
//!
//! Translates crossterm key events into session messages. What a key means
//! depends only on the active screen; the session decides what to do with it.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::trace;

use crate::session::{Disposition, Msg, Screen};

/// Map a key press on `screen` to a message, or `None` to drop it
pub fn map_key(screen: Screen, key: KeyEvent) -> Option<Msg> {
    trace!(?screen, ?key, "map_key: called");
    // Windows reports releases too
    if key.kind != KeyEventKind::Press {
        return None;
    }

    if let (KeyCode::Char('c'), KeyModifiers::CONTROL) = (key.code, key.modifiers) {
        return Some(Msg::Quit);
    }

    match screen {
        Screen::Menu | Screen::Query | Screen::Mode => typing_key(key),
        Screen::AwaitingPlan => match key.code {
            KeyCode::Esc => Some(Msg::Back),
            _ => None,
        },
        Screen::Steps => match key.code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => Some(Msg::Confirm(Disposition::Approve)),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Char('s') => Some(Msg::Confirm(Disposition::Skip)),
            KeyCode::Esc | KeyCode::Char('c') => Some(Msg::Confirm(Disposition::Cancel)),
            _ => None,
        },
        Screen::Executing => None,
        Screen::History | Screen::Done => match key.code {
            KeyCode::Enter => Some(Msg::Submit),
            KeyCode::Esc => Some(Msg::Back),
            KeyCode::Char('q') => Some(Msg::Char('q')),
            _ => None,
        },
    }
}

fn typing_key(key: KeyEvent) -> Option<Msg> {
    match (key.code, key.modifiers) {
        (KeyCode::Enter, _) => Some(Msg::Submit),
        (KeyCode::Esc, _) => Some(Msg::Back),
        (KeyCode::Backspace, _) => Some(Msg::Backspace),
        (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => Some(Msg::Char(c)),
        _ => None,
    }
}
