// src/exec/executor.rs

//! Runs a `ScriptInvocation` against the interpreter session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::exec::invocation::ScriptInvocation;
use crate::exec::protocol::{OutputLine, ProgressProtocol};
use crate::logging::SCRIPT_TARGET;
use crate::session::{InterpreterSession, SessionPhase, SessionState, StreamKind};

/// Everything a successful invocation printed, classified, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub lines: Vec<OutputLine>,
}

impl CapturedOutput {
    pub fn new(lines: Vec<OutputLine>) -> Self {
        Self { lines }
    }

    pub fn progress(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            OutputLine::Progress(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn logs(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            OutputLine::Log(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn last_log(&self) -> Option<&str> {
        self.logs().last()
    }
}

/// Trait abstracting how scripts are executed.
///
/// Production code uses [`CommandExecutor`]; tests can provide their own
/// implementation that doesn't start an interpreter.
pub trait ScriptRunner: Send + Sync {
    /// Run the invocation to completion, honouring its cancellation token
    /// and feeding its progress/log sinks.
    fn execute(
        &self,
        invocation: ScriptInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<CapturedOutput>> + Send + '_>>;
}

/// Real script runner backed by the shared interpreter session.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    session: Arc<InterpreterSession>,
    protocol: ProgressProtocol,
    state: SessionState,
}

impl CommandExecutor {
    pub fn new(session: Arc<InterpreterSession>, state: SessionState) -> Self {
        let protocol = ProgressProtocol::new(session.config().progress_marker.clone());
        Self {
            session,
            protocol,
            state,
        }
    }

    pub fn session(&self) -> &Arc<InterpreterSession> {
        &self.session
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    async fn run(&self, invocation: ScriptInvocation) -> Result<CapturedOutput> {
        if self.session.phase() != SessionPhase::Open {
            return Err(EngineError::SessionNotReady(format!(
                "interpreter session is {:?}",
                self.session.phase()
            )));
        }

        let cancel = invocation.cancel_token().cloned();
        if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(EngineError::OperationCancelled);
        }

        let script = invocation.render(self.session.config());
        debug!(source = ?invocation.source(), params = ?invocation.params(), "executing script");

        let protocol = &self.protocol;
        let progress = invocation.progress_sink().cloned();
        let log = invocation.log_sink().cloned();
        let mut lines: Vec<OutputLine> = Vec::new();

        let result = self
            .session
            .run_script(&script, cancel.as_ref(), |stream, raw| {
                let classified = match stream {
                    StreamKind::Stdout => protocol.classify(raw),
                    StreamKind::Stderr => protocol.classify_error(raw),
                };
                let Some(line) = classified else {
                    return;
                };

                match &line {
                    OutputLine::Progress(text) => {
                        debug!(target: SCRIPT_TARGET, progress = %text);
                        if let Some(sink) = &progress {
                            sink(text);
                        }
                    }
                    OutputLine::Log(text) => {
                        info!(target: SCRIPT_TARGET, "{text}");
                        if let Some(sink) = &log {
                            sink(text);
                        }
                    }
                    OutputLine::Error(text) => {
                        warn!(target: SCRIPT_TARGET, "{text}");
                    }
                }
                lines.push(line);
            })
            .await;

        match result {
            Ok(_) => {}
            Err(err @ (EngineError::OperationCancelled | EngineError::SessionUnavailable(_))) => {
                // A killed or lost interpreter took its endpoint connections with it.
                if self.session.phase() != SessionPhase::Open {
                    self.state.reset();
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        }

        // Finished, but too late: a requested cancellation wins.
        if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(EngineError::OperationCancelled);
        }

        let errors: Vec<&str> = lines
            .iter()
            .filter_map(|l| match l {
                OutputLine::Error(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        if !errors.is_empty() {
            return Err(EngineError::ScriptFailed(errors.join("; ")));
        }

        Ok(CapturedOutput::new(lines))
    }
}

impl ScriptRunner for CommandExecutor {
    fn execute(
        &self,
        invocation: ScriptInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<CapturedOutput>> + Send + '_>> {
        Box::pin(self.run(invocation))
    }
}
