// src/session/interpreter.rs

//! The one long-lived interpreter process.
//!
//! Scripts are written to the interpreter's stdin, each followed by a
//! terminator command that prints a per-call sentinel on stdout and stderr.
//! Output is read line by line until both sentinels have been seen, so the
//! caller gets every line while the script is still running. Lines are
//! decoded lossily; bytes that are not UTF-8 become U+FFFD.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Split};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::InterpreterConfig;
use crate::errors::{EngineError, Result};
use crate::exec::invocation::SENTINEL_TOKEN;

/// How long `close` waits for the interpreter to exit before killing it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Open,
    Closed,
}

/// Which interpreter stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Everything one script printed, sentinels removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

enum SessionInner {
    Uninitialized,
    Open(LiveInterpreter),
    Closed,
}

/// Owns the interpreter process and serializes every script through it.
pub struct InterpreterSession {
    config: InterpreterConfig,
    inner: Mutex<SessionInner>,
    phase: watch::Sender<SessionPhase>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for InterpreterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterSession")
            .field("program", &self.config.program)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl InterpreterSession {
    pub fn new(config: InterpreterConfig) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Uninitialized);
        Self {
            config,
            inner: Mutex::new(SessionInner::Uninitialized),
            phase,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Current phase; does not wait for a running script.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Start the interpreter. A no-op if it is already open.
    ///
    /// Fails with `SessionUnavailable` if the process cannot start or does
    /// not answer the initial handshake, and with `SessionNotReady` if the
    /// session was closed.
    pub async fn open(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;

        match &*guard {
            SessionInner::Open(_) => {
                debug!("interpreter session already open");
                return Ok(());
            }
            SessionInner::Closed => {
                return Err(EngineError::SessionNotReady(
                    "session was closed; create a new session".to_string(),
                ));
            }
            SessionInner::Uninitialized => {}
        }

        let mut live = LiveInterpreter::spawn(&self.config)?;

        let sentinel = self.next_sentinel();
        let payload = self.frame("", &sentinel);
        if let Err(err) = live.exchange(&payload, &sentinel, |_, _| {}).await {
            live.kill().await;
            return Err(err);
        }

        *guard = SessionInner::Open(live);
        self.phase.send_replace(SessionPhase::Open);
        info!(program = %self.config.program, "interpreter session opened");
        Ok(())
    }

    /// Ask the interpreter to exit, killing it if it does not. Safe to call
    /// any number of times, and before `open`.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        let previous = std::mem::replace(&mut *guard, SessionInner::Closed);
        self.phase.send_replace(SessionPhase::Closed);

        match previous {
            SessionInner::Open(live) => {
                live.shutdown(&self.config.exit_command).await;
                info!("interpreter session closed");
            }
            SessionInner::Uninitialized => debug!("closing a session that never opened"),
            SessionInner::Closed => debug!("interpreter session already closed"),
        }
    }

    /// Run one script and return its output.
    ///
    /// `on_line` sees every non-sentinel line as soon as it is read. If
    /// `cancel` fires while the script runs, the interpreter is killed, the
    /// session goes back to `Uninitialized`, and `OperationCancelled` is
    /// returned. If it fires while waiting behind another script, the call
    /// returns `OperationCancelled` and the interpreter is left alone.
    pub async fn run_script<F>(
        &self,
        script: &str,
        cancel: Option<&CancellationToken>,
        on_line: F,
    ) -> Result<RawOutput>
    where
        F: FnMut(StreamKind, &str) + Send,
    {
        let mut guard = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("cancelled while waiting for the interpreter");
                    return Err(EngineError::OperationCancelled);
                }
                guard = self.inner.lock() => guard,
            },
            None => self.inner.lock().await,
        };

        let outcome = {
            let live = match &mut *guard {
                SessionInner::Open(live) => live,
                SessionInner::Uninitialized => {
                    return Err(EngineError::SessionNotReady(
                        "interpreter session is not open".to_string(),
                    ));
                }
                SessionInner::Closed => {
                    return Err(EngineError::SessionNotReady(
                        "interpreter session is closed".to_string(),
                    ));
                }
            };

            let sentinel = self.next_sentinel();
            let payload = self.frame(script, &sentinel);
            let exchange = live.exchange(&payload, &sentinel, on_line);

            match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    res = exchange => Some(res),
                },
                None => Some(exchange.await),
            }
        };

        match outcome {
            Some(Ok(output)) => Ok(output),
            Some(Err(err)) => {
                if err.is_session_level() {
                    warn!(error = %err, "interpreter stopped responding; session reset");
                    self.discard(&mut guard).await;
                }
                Err(err)
            }
            None => {
                info!("cancellation requested; stopping interpreter");
                self.discard(&mut guard).await;
                Err(EngineError::OperationCancelled)
            }
        }
    }

    async fn discard(&self, inner: &mut SessionInner) {
        if let SessionInner::Open(mut live) =
            std::mem::replace(inner, SessionInner::Uninitialized)
        {
            live.kill().await;
        }
        self.phase.send_replace(SessionPhase::Uninitialized);
    }

    fn next_sentinel(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("__VIMIGRATE_DONE_{}_{}__", std::process::id(), seq)
    }

    fn frame(&self, script: &str, sentinel: &str) -> String {
        let terminator = self.config.terminator.replace(SENTINEL_TOKEN, sentinel);
        if script.trim().is_empty() {
            format!("{terminator}\n")
        } else {
            format!("{}\n{terminator}\n", script.trim_end())
        }
    }
}

struct LiveInterpreter {
    child: Child,
    stdin: ChildStdin,
    stdout: Split<BufReader<ChildStdout>>,
    stderr: Split<BufReader<ChildStderr>>,
}

impl LiveInterpreter {
    fn spawn(cfg: &InterpreterConfig) -> Result<Self> {
        let mut cmd = Command::new(&cfg.program);
        cmd.args(&cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::SessionUnavailable(format!(
                "failed to start interpreter '{}': {e}",
                cfg.program
            ))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(EngineError::SessionUnavailable(
                "interpreter pipes were not captured".to_string(),
            ));
        };

        debug!(program = %cfg.program, pid = ?child.id(), "interpreter process spawned");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).split(b'\n'),
            stderr: BufReader::new(stderr).split(b'\n'),
        })
    }

    /// Write `payload` and read both streams until `sentinel` shows up on each.
    ///
    /// Stdin is fed while both streams are read; a script larger than the
    /// pipe buffer may print before the interpreter has read all of it.
    async fn exchange<F>(&mut self, payload: &str, sentinel: &str, mut on_line: F) -> Result<RawOutput>
    where
        F: FnMut(StreamKind, &str) + Send,
    {
        let Self {
            stdin,
            stdout,
            stderr,
            ..
        } = self;

        let write = async {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| unavailable("writing to interpreter stdin", e))?;
            stdin
                .flush()
                .await
                .map_err(|e| unavailable("flushing interpreter stdin", e))
        };
        tokio::pin!(write);

        let mut output = RawOutput::default();
        let mut written = false;
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                res = &mut write, if !written => {
                    res?;
                    written = true;
                }
                line = stdout.next_segment(), if !stdout_done => {
                    let line = read_line(line, "stdout")?;
                    let (content, hit) = split_sentinel(&line, sentinel);
                    if let Some(content) = content {
                        on_line(StreamKind::Stdout, content);
                        output.stdout.push(content.to_string());
                    }
                    stdout_done = hit;
                }
                line = stderr.next_segment(), if !stderr_done => {
                    let line = read_line(line, "stderr")?;
                    let (content, hit) = split_sentinel(&line, sentinel);
                    if let Some(content) = content {
                        on_line(StreamKind::Stderr, content);
                        output.stderr.push(content.to_string());
                    }
                    stderr_done = hit;
                }
            }
        }

        Ok(output)
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill interpreter process");
        }
    }

    async fn shutdown(mut self, exit_command: &str) {
        let exit = format!("{exit_command}\n");
        if let Err(e) = self.stdin.write_all(exit.as_bytes()).await {
            debug!(error = %e, "interpreter stdin already closed");
        }
        drop(self.stdin);

        match tokio::time::timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "interpreter exited"),
            Ok(Err(e)) => warn!(error = %e, "waiting for interpreter exit failed"),
            Err(_) => {
                warn!("interpreter did not exit in time; killing it");
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "failed to kill interpreter process");
                }
            }
        }
    }
}

fn unavailable(context: &str, err: std::io::Error) -> EngineError {
    EngineError::SessionUnavailable(format!("{context}: {err}"))
}

fn read_line(segment: std::io::Result<Option<Vec<u8>>>, stream: &str) -> Result<String> {
    match segment {
        Ok(Some(bytes)) => Ok(decode_line(&bytes)),
        Ok(None) => Err(EngineError::SessionUnavailable(format!(
            "interpreter closed its {stream}"
        ))),
        Err(e) => Err(unavailable(&format!("reading interpreter {stream}"), e)),
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

/// Split a read line into real content and whether it ended with the sentinel.
///
/// Output printed without a trailing newline shares the sentinel's line, so
/// the text before the sentinel is kept.
fn split_sentinel<'a>(line: &'a str, sentinel: &str) -> (Option<&'a str>, bool) {
    let trimmed = line.trim_end();
    match trimmed.strip_suffix(sentinel) {
        Some(prefix) if prefix.trim().is_empty() => (None, true),
        Some(prefix) => (Some(prefix), true),
        None => (Some(line), false),
    }
}
