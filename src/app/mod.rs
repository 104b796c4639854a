//! Host side of the application: mode loops, terminal plumbing and the
//! session worker thread.

mod events;
mod modes;
mod terminal;
mod worker;

pub use modes::{run_text_mode, run_tui_mode};
pub use worker::{SessionWorkerParams, spawn_session_worker};
