//! Session protocol engine: byte framing plus the per-session command
//! state machine.

pub mod engine;
pub mod framing;

pub use engine::CommandEngine;
pub use framing::run_session;
