// src/workflow/orchestrator.rs

//! Sequential workflow orchestration.
//!
//! Tasks run strictly one after another, in the order selected: most
//! operations depend on the endpoints a previous connect established and
//! share the single interpreter session. A Failed task does not stop the
//! run; a Cancelled one does.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::exec::{CapturedOutput, ScriptInvocation, ScriptRunner};
use crate::session::SessionState;
use crate::workflow::operation::{Operation, PARAM_BACKUP_ROOT, PARAM_OUTPUT_DIR, operation_dir};
use crate::workflow::run::{
    RunPublisher, RunSnapshot, WorkflowEvent, WorkflowReport, overall_percentage,
};
use crate::workflow::task::{TaskRecord, TaskStatus};

#[derive(Clone)]
pub struct WorkflowOrchestrator {
    runner: Arc<dyn ScriptRunner>,
    state: SessionState,
    backup_root: PathBuf,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("backup_root", &self.backup_root)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    pub fn new(
        runner: Arc<dyn ScriptRunner>,
        state: SessionState,
        backup_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            state,
            backup_root: backup_root.into(),
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Start a run on a background task and return a handle to observe,
    /// cancel and await it.
    pub fn spawn(&self, operations: Vec<Operation>) -> WorkflowHandle {
        let cancel = CancellationToken::new();
        let initial = initial_snapshot(&operations);
        let (snap_tx, snap_rx) = watch::channel(initial);
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let publisher = RunPublisher::new(snap_tx, Some(ev_tx));

        let this = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { this.execute(operations, token, publisher).await });

        WorkflowHandle {
            cancel,
            snapshot: snap_rx,
            events: ev_rx,
            join,
        }
    }

    /// Run to the end on the current task.
    ///
    /// `snapshot` receives the live run state; `events`, if given, receives
    /// progress notifications.
    pub async fn run(
        &self,
        operations: Vec<Operation>,
        cancel: CancellationToken,
        snapshot: watch::Sender<RunSnapshot>,
        events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
    ) -> Result<WorkflowReport> {
        let publisher = RunPublisher::new(snapshot, events);
        self.execute(operations, cancel, publisher).await
    }

    async fn execute(
        &self,
        operations: Vec<Operation>,
        cancel: CancellationToken,
        publisher: RunPublisher,
    ) -> Result<WorkflowReport> {
        let started_at = Utc::now();
        let total = operations.len();
        publisher.reset(initial_snapshot(&operations).tasks);

        info!(total, "workflow run started");

        let mut completed = 0usize;
        let mut cancelled = false;

        for (index, op) in operations.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    remaining = total - index,
                    "cancellation requested; not starting further tasks"
                );
                cancelled = true;
                break;
            }

            publisher.update_task(index, |t| t.queue());
            let status = self.run_task(index, op, &cancel, &publisher).await?;

            if matches!(status, TaskStatus::Completed | TaskStatus::Failed) {
                completed += 1;
                publisher.set_completed(completed);
            }
            publisher.emit(WorkflowEvent::OverallProgress {
                completed,
                total,
                percentage: overall_percentage(completed, total),
            });

            if status == TaskStatus::Cancelled {
                info!(task = %op.name, "task cancelled; stopping run");
                cancelled = true;
                break;
            }
        }

        let snapshot = publisher.current();
        let report = WorkflowReport {
            started_at,
            finished_at: Utc::now(),
            cancelled,
            completed: snapshot.completed,
            total: snapshot.total,
            tasks: snapshot.tasks,
        };

        info!(
            completed = report.completed,
            total = report.total,
            failed = report.count(TaskStatus::Failed),
            cancelled = report.cancelled,
            "workflow run finished"
        );

        Ok(report)
    }

    /// Run one queued task to a terminal state.
    ///
    /// Only session-level failures come back as `Err`; the task is marked
    /// Failed first.
    async fn run_task(
        &self,
        index: usize,
        op: &Operation,
        cancel: &CancellationToken,
        publisher: &RunPublisher,
    ) -> Result<TaskStatus> {
        if let Some(role) = op.requires.iter().find(|r| !self.state.is_connected(**r)) {
            let msg = format!("{role} endpoint is not connected");
            warn!(task = %op.name, endpoint = %role, "required endpoint not connected; skipping");
            return Ok(self.finish(index, publisher, |t| t.fail(Utc::now(), &msg)));
        }

        let output_dir = operation_dir(&self.backup_root, &op.name);
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            let msg = format!("cannot create {}: {e}", output_dir.display());
            warn!(task = %op.name, error = %e, "output directory unavailable");
            return Ok(self.finish(index, publisher, |t| t.fail(Utc::now(), &msg)));
        }

        publisher.update_task(index, |t| t.start(Utc::now()));
        publisher.emit(WorkflowEvent::TaskStarted {
            index,
            name: op.name.clone(),
        });
        info!(task = %op.name, object_type = %op.object_type, "task started");

        let progress_pub = publisher.clone();
        let log_pub = publisher.clone();
        let invocation = ScriptInvocation::new(op.source.clone())
            .with_params(op.params.clone())
            .with_param(PARAM_BACKUP_ROOT, self.backup_root.to_string_lossy())
            .with_param(PARAM_OUTPUT_DIR, output_dir.to_string_lossy())
            .with_cancel(cancel.clone())
            .on_progress(move |text| progress_pub.progress(index, text))
            .on_log(move |line| log_pub.log(index, line));

        let result = self.runner.execute(invocation).await;

        match result {
            Ok(output) => {
                if let Some(missing) = missing_done_marker(op, &output) {
                    let msg = format!("script finished without reporting '{missing}'");
                    warn!(task = %op.name, "{msg}");
                    Ok(self.finish(index, publisher, |t| t.fail(Utc::now(), &msg)))
                } else {
                    Ok(self.finish(index, publisher, |t| t.complete(Utc::now())))
                }
            }
            Err(EngineError::OperationCancelled) => {
                Ok(self.finish(index, publisher, |t| t.cancel(Utc::now())))
            }
            Err(err) if err.is_session_level() => {
                warn!(task = %op.name, error = %err, "session failure; aborting run");
                let msg = err.to_string();
                self.finish(index, publisher, |t| t.fail(Utc::now(), &msg));
                Err(err)
            }
            Err(err) => {
                let msg = match &err {
                    EngineError::ScriptFailed(m) if !m.trim().is_empty() => m.clone(),
                    EngineError::ScriptFailed(_) => "script reported an error".to_string(),
                    other => other.to_string(),
                };
                warn!(task = %op.name, error = %msg, "task failed; continuing with next task");
                Ok(self.finish(index, publisher, |t| t.fail(Utc::now(), &msg)))
            }
        }
    }

    /// Apply a terminal transition and announce it. Returns the resulting status.
    fn finish<F>(&self, index: usize, publisher: &RunPublisher, f: F) -> TaskStatus
    where
        F: FnOnce(&mut TaskRecord) -> bool,
    {
        publisher.update_task(index, f);

        match publisher.task(index) {
            Some(task) => {
                debug!(task = %task.object_name(), status = ?task.status(), "task finished");
                publisher.emit(WorkflowEvent::TaskFinished {
                    index,
                    name: task.object_name().to_string(),
                    status: task.status(),
                    details: task.details().to_string(),
                });
                task.status()
            }
            None => TaskStatus::Failed,
        }
    }
}

fn initial_snapshot(operations: &[Operation]) -> RunSnapshot {
    let tasks: Vec<TaskRecord> = operations
        .iter()
        .map(|op| TaskRecord::new(op.name.clone(), op.object_type))
        .collect();
    RunSnapshot {
        total: tasks.len(),
        tasks,
        completed: 0,
    }
}

fn missing_done_marker<'a>(op: &'a Operation, output: &CapturedOutput) -> Option<&'a str> {
    let marker = op.done_marker.as_deref()?;
    if output.logs().any(|line| line.contains(marker)) {
        None
    } else {
        Some(marker)
    }
}

/// Handle to a run started with [`WorkflowOrchestrator::spawn`].
pub struct WorkflowHandle {
    cancel: CancellationToken,
    snapshot: watch::Receiver<RunSnapshot>,
    events: mpsc::UnboundedReceiver<WorkflowEvent>,
    join: JoinHandle<Result<WorkflowReport>>,
}

impl WorkflowHandle {
    /// Cancel the active task and every task after it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.clone()
    }

    /// Next event; `None` once the run has finished and all events were read.
    pub async fn next_event(&mut self) -> Option<WorkflowEvent> {
        self.events.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> Result<WorkflowReport> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::Other(anyhow::anyhow!(
                "workflow task terminated abnormally: {e}"
            ))),
        }
    }
}
