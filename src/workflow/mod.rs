// src/workflow/mod.rs

//! Workflow orchestration.
//!
//! - [`task`] holds `TaskRecord` and its status machine.
//! - [`operation`] defines operations, selection and the backup layout.
//! - [`run`] holds run snapshots, events and the final report/ledger.
//! - [`orchestrator`] runs a selection of operations one after another.

pub mod operation;
pub mod orchestrator;
pub mod run;
pub mod task;

pub use operation::{
    Operation, PARAM_BACKUP_ROOT, PARAM_OUTPUT_DIR, operation_dir, sanitize_object_name,
    select_operations,
};
pub use orchestrator::{WorkflowHandle, WorkflowOrchestrator};
pub use run::{LedgerEntry, RunSnapshot, WorkflowEvent, WorkflowReport, overall_percentage};
pub use task::{TaskRecord, TaskStatus};
