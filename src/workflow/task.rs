// src/workflow/task.rs

//! `TaskRecord`: one selected operation inside a workflow run.
//!
//! Status moves `Pending -> Queued -> InProgress -> {Completed | Failed |
//! Cancelled}`. Terminal states are final; transitions that do not fit the
//! machine are ignored and logged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::types::ObjectType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Read-only to collaborators; only the orchestrator mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    object_name: String,
    object_type: ObjectType,
    status: TaskStatus,
    progress: u8,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    details: String,
}

impl TaskRecord {
    pub fn new(object_name: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            object_name: object_name.into(),
            object_type,
            status: TaskStatus::Pending,
            progress: 0,
            start_time: None,
            end_time: None,
            details: String::new(),
        }
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// 0..=100, never decreases while the task runs.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Latest human-readable status line.
    pub fn details(&self) -> &str {
        &self.details
    }

    /// Time spent so far, or in total once finished. `None` until started.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(Utc::now);
        Some(end - start)
    }

    pub(crate) fn queue(&mut self) -> bool {
        self.transition(TaskStatus::Queued, &[TaskStatus::Pending])
    }

    pub(crate) fn start(&mut self, now: DateTime<Utc>) -> bool {
        if !self.transition(TaskStatus::InProgress, &[TaskStatus::Queued]) {
            return false;
        }
        self.start_time = Some(now);
        self.details = "Started".to_string();
        true
    }

    /// Fold a progress line in. Ignored unless the task is running.
    pub(crate) fn record_progress(&mut self, percent: Option<u8>, details: &str) {
        if self.status != TaskStatus::InProgress {
            return;
        }
        if let Some(p) = percent {
            self.progress = self.progress.max(p.min(100));
        }
        if !details.trim().is_empty() {
            self.details = details.trim().to_string();
        }
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>) -> bool {
        if !self.transition(TaskStatus::Completed, &[TaskStatus::InProgress]) {
            return false;
        }
        self.progress = 100;
        if self.details.is_empty() || self.details == "Started" {
            self.details = "Completed".to_string();
        }
        self.stamp_end(now);
        true
    }

    /// Failing a task that never started (e.g. a gating failure) stamps the
    /// start time too, so `end_time >= start_time` always holds.
    pub(crate) fn fail(&mut self, now: DateTime<Utc>, message: &str) -> bool {
        if !self.transition(
            TaskStatus::Failed,
            &[TaskStatus::Queued, TaskStatus::InProgress],
        ) {
            return false;
        }
        let message = message.trim();
        self.details = if message.is_empty() {
            "Failed".to_string()
        } else {
            message.to_string()
        };
        self.stamp_end(now);
        true
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if !self.transition(
            TaskStatus::Cancelled,
            &[TaskStatus::Queued, TaskStatus::InProgress],
        ) {
            return false;
        }
        self.details = "Cancelled".to_string();
        self.stamp_end(now);
        true
    }

    fn stamp_end(&mut self, now: DateTime<Utc>) {
        let start = *self.start_time.get_or_insert(now);
        self.end_time = Some(now.max(start));
    }

    fn transition(&mut self, to: TaskStatus, allowed_from: &[TaskStatus]) -> bool {
        if allowed_from.contains(&self.status) {
            self.status = to;
            true
        } else {
            warn!(
                task = %self.object_name,
                from = ?self.status,
                to = ?to,
                "ignoring invalid task transition"
            );
            false
        }
    }
}
