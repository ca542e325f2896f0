// src/exec/mod.rs

//! Script execution layer.
//!
//! - [`invocation`] describes one script run (source, parameters, sinks).
//! - [`protocol`] classifies output lines into progress, log and error.
//! - [`executor`] holds the `ScriptRunner` trait and `CommandExecutor`,
//!   which runs invocations through the shared interpreter session.

pub mod executor;
pub mod invocation;
pub mod protocol;

pub use executor::{CapturedOutput, CommandExecutor, ScriptRunner};
pub use invocation::{LineSink, ScriptInvocation, ScriptSource};
pub use protocol::{OutputLine, ProgressProtocol, ProgressUpdate};
