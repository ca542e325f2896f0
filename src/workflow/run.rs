// src/workflow/run.rs

//! Observable run state: snapshots, events and the final report.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::errors::Result;
use crate::exec::ProgressUpdate;
use crate::types::ObjectType;
use crate::workflow::task::{TaskRecord, TaskStatus};

/// `completed / total * 100`, recomputed from the counters every time.
/// An empty run counts as done.
pub fn overall_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

/// Read-only view of a run at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub tasks: Vec<TaskRecord>,
    /// Tasks that finished as Completed or Failed. Only ever increases.
    pub completed: usize,
    /// Fixed when the run is created.
    pub total: usize,
}

impl RunSnapshot {
    pub fn percentage(&self) -> f64 {
        overall_percentage(self.completed, self.total)
    }

    pub fn task(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.object_name() == name)
    }
}

/// Notifications sent while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    TaskStarted {
        index: usize,
        name: String,
    },
    TaskProgress {
        index: usize,
        name: String,
        progress: u8,
        details: String,
    },
    /// A non-progress line printed by the task's script.
    TaskLog {
        index: usize,
        name: String,
        line: String,
    },
    TaskFinished {
        index: usize,
        name: String,
        status: TaskStatus,
        details: String,
    },
    OverallProgress {
        completed: usize,
        total: usize,
        percentage: f64,
    },
}

/// Final state of a run, plus the ledger of what succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True if the run stopped early because of cancellation.
    pub cancelled: bool,
    pub completed: usize,
    pub total: usize,
    pub tasks: Vec<TaskRecord>,
}

/// One line of the run ledger: an operation that completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub operation: String,
    pub object_type: ObjectType,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct LedgerFile<'a> {
    #[serde(flatten)]
    report: &'a WorkflowReport,
    ledger: Vec<LedgerEntry>,
}

impl WorkflowReport {
    /// Completed operations in the order they ran.
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Completed)
            .map(|t| LedgerEntry {
                operation: t.object_name().to_string(),
                object_type: t.object_type(),
                finished_at: t.end_time(),
            })
            .collect()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.status() == TaskStatus::Failed)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status() == status).count()
    }

    /// Write the report and ledger as pretty JSON, creating parent dirs.
    pub fn write_ledger(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = LedgerFile {
            report: self,
            ledger: self.ledger(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Shared write side of a run: the snapshot channel plus the event sender.
///
/// Cloned into the progress/log sinks of each invocation, so updates land
/// on the record while the script is still running.
#[derive(Clone)]
pub(crate) struct RunPublisher {
    snapshot: Arc<watch::Sender<RunSnapshot>>,
    events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl RunPublisher {
    pub(crate) fn new(
        snapshot: watch::Sender<RunSnapshot>,
        events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
    ) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            events,
        }
    }

    pub(crate) fn reset(&self, tasks: Vec<TaskRecord>) {
        let total = tasks.len();
        self.snapshot.send_replace(RunSnapshot {
            tasks,
            completed: 0,
            total,
        });
    }

    pub(crate) fn current(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Apply `f` to one record; returns what `f` returned.
    pub(crate) fn update_task<F, T>(&self, index: usize, f: F) -> Option<T>
    where
        F: FnOnce(&mut TaskRecord) -> T,
    {
        let mut out = None;
        self.snapshot.send_if_modified(|snap| match snap.tasks.get_mut(index) {
            Some(task) => {
                out = Some(f(task));
                true
            }
            None => false,
        });
        out
    }

    pub(crate) fn task(&self, index: usize) -> Option<TaskRecord> {
        self.snapshot.borrow().tasks.get(index).cloned()
    }

    pub(crate) fn set_completed(&self, completed: usize) {
        self.snapshot.send_modify(|snap| {
            snap.completed = snap.completed.max(completed);
        });
    }

    pub(crate) fn progress(&self, index: usize, text: &str) {
        let update = ProgressUpdate::parse(text);
        let recorded = self.update_task(index, |task| {
            task.record_progress(update.percent, &update.message);
            (
                task.object_name().to_string(),
                task.progress(),
                task.details().to_string(),
            )
        });

        if let Some((name, progress, details)) = recorded {
            self.emit(WorkflowEvent::TaskProgress {
                index,
                name,
                progress,
                details,
            });
        }
    }

    pub(crate) fn log(&self, index: usize, line: &str) {
        if let Some(task) = self.task(index) {
            self.emit(WorkflowEvent::TaskLog {
                index,
                name: task.object_name().to_string(),
                line: line.to_string(),
            });
        }
    }

    pub(crate) fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is watching; the run carries on.
            let _ = tx.send(event);
        }
    }
}
