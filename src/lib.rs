// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod session;
pub mod types;
pub mod workflow;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::exec::CommandExecutor;
use crate::session::{InterpreterSession, SessionState, connect_endpoint, disconnect_all};
use crate::workflow::{
    Operation, WorkflowEvent, WorkflowOrchestrator, WorkflowReport, select_operations,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and operation selection
/// - the interpreter session and executor
/// - endpoint connect / disconnect
/// - the workflow run, its progress display and ledger
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)?;

    if args.list {
        print_operations(&cfg);
        return Ok(());
    }

    let operations = select_operations(&cfg, &args.operations)?;
    let backup_root = args
        .backup_root
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.backup.root.clone());

    if args.dry_run {
        print_dry_run(&cfg, &operations, &backup_root);
        return Ok(());
    }

    let state = SessionState::new();
    let session = Arc::new(InterpreterSession::new(cfg.interpreter.clone()));
    session.open().await?;

    let executor = Arc::new(CommandExecutor::new(Arc::clone(&session), state.clone()));

    let outcome = run_with_session(&cfg, Arc::clone(&executor), &state, operations, &backup_root).await;

    if let Err(e) = disconnect_all(executor.as_ref(), &state, &cfg.endpoint).await {
        warn!(error = %e, "disconnecting endpoints failed");
    }
    session.close().await;

    let report = outcome?;
    let failed = report.count(workflow::TaskStatus::Failed);
    if report.cancelled {
        bail!("run cancelled after {}/{} operations", report.completed, report.total);
    }
    if failed > 0 {
        bail!("{failed} of {} operations failed", report.total);
    }
    Ok(())
}

async fn run_with_session(
    cfg: &ConfigFile,
    executor: Arc<CommandExecutor>,
    state: &SessionState,
    operations: Vec<Operation>,
    backup_root: &Path,
) -> Result<WorkflowReport> {
    for (role, endpoint) in cfg.endpoint.configured() {
        match connect_endpoint(executor.as_ref(), state, role, endpoint, None).await {
            Ok(status) => println!("connected {role} (version {})", status.version),
            Err(e) if e.is_session_level() => return Err(e.into()),
            Err(e) => {
                // Operations requiring this endpoint will fail their gate check.
                error!(endpoint = %role, error = %e, "could not connect endpoint");
                println!("could not connect {role}: {e}");
            }
        }
    }

    let orchestrator = WorkflowOrchestrator::new(executor, state.clone(), backup_root);
    let mut handle = orchestrator.spawn(operations);

    // First Ctrl-C cancels the run; a second one exits without cleanup.
    let token = handle.cancel_token();
    tokio::spawn(async move {
        if interrupt_loop(token, tokio::signal::ctrl_c).await {
            warn!("second Ctrl+C received; exiting without cleanup");
            std::process::exit(130);
        }
    });

    while let Some(event) = handle.next_event().await {
        print_event(&event);
    }

    let report = handle.wait().await?;

    let ledger_path = backup_root.join(&cfg.backup.ledger_file);
    report.write_ledger(&ledger_path)?;
    info!(path = %ledger_path.display(), "run ledger written");

    print_summary(&report);
    Ok(report)
}

/// Cancel `token` on the first interrupt. Returns true once a second
/// interrupt arrives, false if the listener fails.
async fn interrupt_loop<F, Fut>(token: CancellationToken, mut next_interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        eprintln!("failed to listen for Ctrl+C: {e}");
        return false;
    }
    info!("Ctrl+C received; cancelling run");
    eprintln!("cancelling; press Ctrl+C again to exit immediately");
    token.cancel();

    match next_interrupt().await {
        Ok(()) => true,
        Err(e) => {
            eprintln!("failed to listen for Ctrl+C: {e}");
            false
        }
    }
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::TaskStarted { index, name } => {
            println!("[{}] {name}: started", index + 1);
        }
        WorkflowEvent::TaskProgress {
            index,
            name,
            progress,
            details,
        } => {
            println!("[{}] {name}: {progress:>3}% {details}", index + 1);
        }
        WorkflowEvent::TaskLog { name, line, .. } => {
            debug!(task = %name, "{line}");
        }
        WorkflowEvent::TaskFinished {
            index,
            name,
            status,
            details,
        } => {
            println!("[{}] {name}: {status:?} - {details}", index + 1);
        }
        WorkflowEvent::OverallProgress {
            completed,
            total,
            percentage,
        } => {
            println!("overall: {completed}/{total} ({percentage:.0}%)");
        }
    }
}

fn print_summary(report: &WorkflowReport) {
    println!();
    println!(
        "{} of {} operations finished{}",
        report.completed,
        report.total,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for task in report.tasks.iter() {
        let duration = task
            .duration()
            .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<24} {:<11} {:>7}  {}",
            task.object_name(),
            format!("{:?}", task.status()),
            duration,
            task.details()
        );
    }
}

fn print_operations(cfg: &ConfigFile) {
    println!("operations ({}):", cfg.operation.len());
    for op in cfg.operation.iter() {
        println!("  - {} ({})", op.name, op.object_type);
    }
}

/// Simple dry-run output: interpreter, endpoints and the selected operations.
fn print_dry_run(cfg: &ConfigFile, operations: &[Operation], backup_root: &Path) {
    println!("vimigrate dry-run");
    println!(
        "  interpreter = {} {}",
        cfg.interpreter.program,
        cfg.interpreter.args.join(" ")
    );
    println!("  progress_marker = {}", cfg.interpreter.progress_marker);
    println!("  backup_root = {}", backup_root.display());
    for (role, _) in cfg.endpoint.configured() {
        println!("  endpoint: {role}");
    }
    println!();

    println!("operations ({}):", operations.len());
    for op in operations {
        println!("  - {}", op.name);
        println!("      object_type: {}", op.object_type);
        println!("      source: {:?}", op.source);
        if !op.params.is_empty() {
            println!("      params: {:?}", op.params);
        }
        if !op.requires.is_empty() {
            println!("      requires: {:?}", op.requires);
        }
        if let Some(ref marker) = op.done_marker {
            println!("      done_marker: {marker}");
        }
    }

    debug!("dry-run complete (no execution)");
}
