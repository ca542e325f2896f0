// src/exec/invocation.rs

//! A single request to run script text inside the interpreter session.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::InterpreterConfig;

/// Placeholder in `[interpreter].terminator` replaced by the per-call sentinel.
pub const SENTINEL_TOKEN: &str = "{sentinel}";

/// Callback receiving progress text (marker already stripped) or log lines.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Script text; `{{Name}}` tokens are replaced by parameter values.
    Inline(String),
    /// Script file called with named arguments.
    File(PathBuf),
}

/// Immutable description of one script run.
#[derive(Clone)]
pub struct ScriptInvocation {
    source: ScriptSource,
    params: BTreeMap<String, String>,
    cancel: Option<CancellationToken>,
    progress: Option<LineSink>,
    log: Option<LineSink>,
}

impl fmt::Debug for ScriptInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInvocation")
            .field("source", &self.source)
            .field("params", &self.params)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl ScriptInvocation {
    pub fn inline(script: impl Into<String>) -> Self {
        Self::new(ScriptSource::Inline(script.into()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(ScriptSource::File(path.into()))
    }

    pub fn new(source: ScriptSource) -> Self {
        Self {
            source,
            params: BTreeMap::new(),
            cancel: None,
            progress: None,
            log: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.params.insert(k.into(), v.into());
        }
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn on_progress(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn on_log(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = Some(Arc::new(sink));
        self
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn progress_sink(&self) -> Option<&LineSink> {
        self.progress.as_ref()
    }

    pub fn log_sink(&self) -> Option<&LineSink> {
        self.log.as_ref()
    }

    /// Produce the exact text written to the interpreter.
    ///
    /// Values are inserted verbatim; escaping interpreter-special characters
    /// is the caller's job.
    pub fn render(&self, cfg: &InterpreterConfig) -> String {
        match &self.source {
            ScriptSource::Inline(text) => replace_tokens(text, &self.params),
            ScriptSource::File(path) => {
                let args: Vec<String> = self
                    .params
                    .iter()
                    .map(|(name, value)| {
                        cfg.named_argument_template
                            .replace("{name}", name)
                            .replace("{value}", value)
                    })
                    .collect();

                cfg.script_file_template
                    .replace("{path}", &path.to_string_lossy())
                    .replace("{args}", &args.join(" "))
            }
        }
    }
}

fn replace_tokens(input: &str, params: &BTreeMap<String, String>) -> String {
    let mut result = input.to_string();
    for (key, value) in params {
        let needle = format!("{{{{{}}}}}", key);
        if result.contains(&needle) {
            result = result.replace(&needle, value);
        }
    }
    result
}
