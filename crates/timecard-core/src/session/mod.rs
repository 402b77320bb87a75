//! Work-session state machine.
//!
//! `SessionState` is the durable record; `SessionController` drives the
//! interactive transitions against it.

mod controller;
mod state;

pub use controller::{Restore, SessionController};
pub use state::{end_of_start_day, SessionState, TaskRef, AUTO_CHECKOUT_MEMO, BREAK_TASK};
