use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use vimigrate::errors::{EngineError, Result};
use vimigrate::exec::{
    CapturedOutput, OutputLine, ProgressProtocol, ScriptInvocation, ScriptRunner, ScriptSource,
};

/// What the fake interpreter does when it sees a given script.
#[derive(Debug, Clone)]
pub enum FakeScript {
    /// Print these stdout lines (classified like real output) and succeed.
    Succeed(Vec<String>),
    /// Report a diagnostic.
    Fail(String),
    /// Hang until the invocation's cancellation token fires.
    WaitForCancel,
    /// Behave as if the interpreter died.
    SessionDown,
}

/// A script run the fake saw, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedScript {
    pub script: String,
    pub params: BTreeMap<String, String>,
}

/// A `ScriptRunner` that never starts a process.
///
/// Scripts are looked up by inline text (or file path); anything not
/// registered succeeds with no output.
#[derive(Default)]
pub struct FakeScriptRunner {
    scripts: Mutex<HashMap<String, FakeScript>>,
    executed: Arc<Mutex<Vec<ExecutedScript>>>,
    protocol: ProgressProtocol,
}

impl FakeScriptRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, script: &str, behaviour: FakeScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(script.to_string(), behaviour);
        self
    }

    pub fn executed(&self) -> Vec<ExecutedScript> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_scripts(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.script).collect()
    }
}

fn key_of(source: &ScriptSource) -> String {
    match source {
        ScriptSource::Inline(text) => text.clone(),
        ScriptSource::File(path) => path.display().to_string(),
    }
}

impl ScriptRunner for FakeScriptRunner {
    fn execute(
        &self,
        invocation: ScriptInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<CapturedOutput>> + Send + '_>> {
        let key = key_of(invocation.source());
        let behaviour = self
            .scripts
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(FakeScript::Succeed(Vec::new()));

        self.executed.lock().unwrap().push(ExecutedScript {
            script: key,
            params: invocation.params().clone(),
        });

        Box::pin(async move {
            let token = invocation.cancel_token().cloned();
            if token.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(EngineError::OperationCancelled);
            }

            match behaviour {
                FakeScript::Succeed(raw_lines) => {
                    let mut lines = Vec::new();
                    for raw in raw_lines {
                        let Some(line) = self.protocol.classify(&raw) else {
                            continue;
                        };
                        match &line {
                            OutputLine::Progress(text) => {
                                if let Some(sink) = invocation.progress_sink() {
                                    sink(text);
                                }
                            }
                            OutputLine::Log(text) => {
                                if let Some(sink) = invocation.log_sink() {
                                    sink(text);
                                }
                            }
                            OutputLine::Error(_) => {}
                        }
                        lines.push(line);
                    }
                    if token.as_ref().is_some_and(|t| t.is_cancelled()) {
                        return Err(EngineError::OperationCancelled);
                    }
                    Ok(CapturedOutput::new(lines))
                }
                FakeScript::Fail(message) => Err(EngineError::ScriptFailed(message)),
                FakeScript::WaitForCancel => match token {
                    Some(t) => {
                        t.cancelled().await;
                        Err(EngineError::OperationCancelled)
                    }
                    None => std::future::pending().await,
                },
                FakeScript::SessionDown => Err(EngineError::SessionUnavailable(
                    "fake interpreter is down".to_string(),
                )),
            }
        })
    }
}
