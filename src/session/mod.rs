// src/session/mod.rs

//! Interpreter session ownership and endpoint state.
//!
//! - [`interpreter`] owns the long-lived interpreter process.
//! - [`state`] tracks whether source/destination are connected.
//! - [`endpoints`] runs connect/disconnect scripts and records results.

pub mod endpoints;
pub mod interpreter;
pub mod state;

pub use endpoints::{connect_endpoint, disconnect_all, disconnect_endpoint};
pub use interpreter::{InterpreterSession, RawOutput, SessionPhase, StreamKind};
pub use state::{EndpointStatus, SessionState};
