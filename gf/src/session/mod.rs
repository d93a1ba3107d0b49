//! Session controller
//!
//! Screen-driven state machine for one operator session. `state` holds the
//! pure data, `machine` the transition function, and `controller` carries out
//! the effects (plan requests, step dispatch) against real collaborators.

mod controller;
mod machine;
mod state;

pub use controller::Controller;
pub use machine::{Disposition, Effect, Msg, Session};
pub use state::{RequestId, Screen, SessionState, StepRecord, StepStatus, THINKING_WORDS};
