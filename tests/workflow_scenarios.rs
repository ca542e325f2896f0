// tests/workflow_scenarios.rs

use vimigrate_test_utils::fake_runner::{FakeScript, FakeScriptRunner};
use vimigrate_test_utils::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::watch;

use vimigrate::errors::EngineError;
use vimigrate::session::{SessionState, connect_endpoint};
use vimigrate::types::EndpointRole;
use vimigrate::workflow::{
    Operation, PARAM_OUTPUT_DIR, RunSnapshot, TaskStatus, WorkflowEvent, WorkflowHandle,
    WorkflowOrchestrator,
};

type TestResult = Result<(), Box<dyn Error>>;

fn orchestrator(runner: Arc<FakeScriptRunner>, root: &TempDir) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(runner, SessionState::new(), root.path())
}

fn switches_and_roles() -> Vec<Operation> {
    vec![
        Operation::inline("switches", "backup-switches"),
        Operation::inline("roles", "backup-roles"),
    ]
}

async fn drain_events(handle: &mut WorkflowHandle) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Some(ev) = handle.next_event().await {
        events.push(ev);
    }
    events
}

fn last_overall_percentage(events: &[WorkflowEvent]) -> Option<f64> {
    events.iter().rev().find_map(|ev| match ev {
        WorkflowEvent::OverallProgress { percentage, .. } => Some(*percentage),
        _ => None,
    })
}

async fn wait_until<F>(rx: &mut watch::Receiver<RunSnapshot>, mut cond: F)
where
    F: FnMut(&RunSnapshot) -> bool,
{
    loop {
        if cond(&rx.borrow_and_update()) {
            return;
        }
        rx.changed().await.expect("run ended before condition was met");
    }
}

#[tokio::test]
async fn both_tasks_succeed() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;

    let runner = Arc::new(
        FakeScriptRunner::new()
            .on(
                "backup-switches",
                FakeScript::Succeed(vec![
                    "PROGRESS:50% Found 3 items".to_string(),
                    "Saved: switches.json".to_string(),
                ]),
            )
            .on("backup-roles", FakeScript::Succeed(vec!["PROGRESS:Reading roles".to_string()])),
    );

    let mut handle = orchestrator(runner.clone(), &root).spawn(switches_and_roles());
    let events = with_timeout(drain_events(&mut handle)).await;
    let report = with_timeout(handle.wait()).await?;

    assert_eq!(report.completed, 2);
    assert_eq!(report.total, 2);
    assert!(!report.cancelled);
    assert!(report.tasks.iter().all(|t| t.status() == TaskStatus::Completed));
    assert!(report.tasks.iter().all(|t| t.progress() == 100));
    assert_eq!(report.tasks[0].details(), "Found 3 items");
    assert_eq!(last_overall_percentage(&events), Some(100.0));

    assert!(events.contains(&WorkflowEvent::TaskLog {
        index: 0,
        name: "switches".to_string(),
        line: "Saved: switches.json".to_string(),
    }));
    assert_eq!(runner.executed_scripts(), vec!["backup-switches", "backup-roles"]);

    let ledger: Vec<_> = report.ledger().into_iter().map(|e| e.operation).collect();
    assert_eq!(ledger, vec!["switches", "roles"]);

    Ok(())
}

#[tokio::test]
async fn failed_task_does_not_block_the_next_one() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;

    let runner = Arc::new(
        FakeScriptRunner::new()
            .on("backup-switches", FakeScript::Fail("Get-VDSwitch: access denied".to_string())),
    );

    let mut handle = orchestrator(runner.clone(), &root).spawn(switches_and_roles());
    let events = with_timeout(drain_events(&mut handle)).await;
    let report = with_timeout(handle.wait()).await?;

    let switches = &report.tasks[0];
    assert_eq!(switches.status(), TaskStatus::Failed);
    assert_eq!(switches.details(), "Get-VDSwitch: access denied");
    assert!(switches.end_time() >= switches.start_time());

    assert_eq!(report.tasks[1].status(), TaskStatus::Completed);
    assert_eq!(report.completed, 2);
    assert_eq!(last_overall_percentage(&events), Some(100.0));
    assert_eq!(runner.executed_scripts(), vec!["backup-switches", "backup-roles"]);

    Ok(())
}

#[tokio::test]
async fn empty_diagnostic_still_gets_details() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let runner = Arc::new(FakeScriptRunner::new().on("backup-roles", FakeScript::Fail(String::new())));

    let handle = orchestrator(runner, &root).spawn(vec![Operation::inline("roles", "backup-roles")]);
    let report = with_timeout(handle.wait()).await?;

    assert_eq!(report.tasks[0].status(), TaskStatus::Failed);
    assert!(!report.tasks[0].details().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancelling_during_second_task_stops_the_run() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;

    let runner = Arc::new(
        FakeScriptRunner::new()
            .on("backup-roles", FakeScript::WaitForCancel)
            .on("backup-permissions", FakeScript::Succeed(vec![])),
    );

    let mut ops = switches_and_roles();
    ops.push(Operation::inline("permissions", "backup-permissions"));

    let handle = orchestrator(runner.clone(), &root).spawn(ops);
    let mut rx = handle.subscribe();

    with_timeout(wait_until(&mut rx, |snap| {
        snap.tasks[1].status() == TaskStatus::InProgress
    }))
    .await;
    handle.cancel();

    let report = with_timeout(handle.wait()).await?;

    assert!(report.cancelled);
    assert_eq!(report.tasks[0].status(), TaskStatus::Completed);
    assert_eq!(report.tasks[1].status(), TaskStatus::Cancelled);
    assert_eq!(report.tasks[2].status(), TaskStatus::Pending);
    assert_eq!(report.completed, 1);
    assert_eq!(runner.executed_scripts(), vec!["backup-switches", "backup-roles"]);

    Ok(())
}

#[tokio::test]
async fn cancel_before_start_leaves_everything_pending() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let runner = Arc::new(FakeScriptRunner::new());
    let orch = orchestrator(runner.clone(), &root);

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let (tx, _rx) = watch::channel(RunSnapshot::default());

    let report = with_timeout(orch.run(switches_and_roles(), cancel, tx, None)).await?;

    assert!(report.cancelled);
    assert_eq!(report.completed, 0);
    assert!(report.tasks.iter().all(|t| t.status() == TaskStatus::Pending));
    assert!(runner.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn operations_requiring_a_disconnected_endpoint_fail_their_gate() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let runner = Arc::new(
        FakeScriptRunner::new().on("connect-src", FakeScript::Succeed(vec!["VERSION:7.0.3".to_string()])),
    );
    let state = SessionState::new();

    let source = vimigrate_test_utils::builders::endpoint("connect-src");
    connect_endpoint(runner.as_ref(), &state, EndpointRole::Source, &source, None).await?;

    let orch = WorkflowOrchestrator::new(runner.clone(), state.clone(), root.path());
    let ops = vec![
        Operation::inline("hosts", "backup-hosts").requires(EndpointRole::Source),
        Operation::inline("migrate-roles", "restore-roles").requires(EndpointRole::Destination),
    ];

    let report = with_timeout(orch.spawn(ops).wait()).await?;

    assert_eq!(report.tasks[0].status(), TaskStatus::Completed);
    assert_eq!(report.tasks[1].status(), TaskStatus::Failed);
    assert_eq!(report.tasks[1].details(), "destination endpoint is not connected");
    assert_eq!(report.completed, 2);
    assert_eq!(runner.executed_scripts(), vec!["connect-src", "backup-hosts"]);
    Ok(())
}

#[tokio::test]
async fn done_marker_must_be_observed() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let runner = Arc::new(
        FakeScriptRunner::new()
            .on("with-marker", FakeScript::Succeed(vec!["Backup complete: 12 roles".to_string()]))
            .on("without-marker", FakeScript::Succeed(vec!["Saved 3 files".to_string()])),
    );

    let ops = vec![
        Operation::inline("roles", "with-marker").with_done_marker("Backup complete"),
        Operation::inline("switches", "without-marker").with_done_marker("Backup complete"),
    ];
    let report = with_timeout(orchestrator(runner, &root).spawn(ops).wait()).await?;

    assert_eq!(report.tasks[0].status(), TaskStatus::Completed);
    assert_eq!(report.tasks[1].status(), TaskStatus::Failed);
    assert!(report.tasks[1].details().contains("Backup complete"));
    Ok(())
}

#[tokio::test]
async fn scripts_receive_their_output_directory() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let runner = Arc::new(FakeScriptRunner::new());

    let ops = vec![Operation::inline("vm folders", "backup-folders").with_param("Server", "vc01")];
    with_timeout(orchestrator(runner.clone(), &root).spawn(ops).wait()).await?;

    let executed = runner.executed();
    let expected_dir = root.path().join("vm folders");
    assert_eq!(
        executed[0].params.get(PARAM_OUTPUT_DIR).cloned(),
        Some(expected_dir.to_string_lossy().into_owned())
    );
    assert_eq!(executed[0].params.get("Server").map(String::as_str), Some("vc01"));
    assert!(expected_dir.is_dir());
    Ok(())
}

#[tokio::test]
async fn session_failure_propagates_and_stops_the_run() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let runner = Arc::new(FakeScriptRunner::new().on("backup-switches", FakeScript::SessionDown));

    let handle = orchestrator(runner.clone(), &root).spawn(switches_and_roles());
    let rx = handle.subscribe();
    let result = with_timeout(handle.wait()).await;

    assert!(matches!(result, Err(EngineError::SessionUnavailable(_))));
    let snap = rx.borrow().clone();
    assert_eq!(snap.tasks[0].status(), TaskStatus::Failed);
    assert!(!snap.tasks[0].details().is_empty());
    assert_eq!(snap.tasks[1].status(), TaskStatus::Pending);
    assert_eq!(runner.executed_scripts(), vec!["backup-switches"]);
    Ok(())
}

#[tokio::test]
async fn empty_selection_finishes_immediately() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let handle = orchestrator(Arc::new(FakeScriptRunner::new()), &root).spawn(Vec::new());
    let report = with_timeout(handle.wait()).await?;

    assert_eq!(report.total, 0);
    assert_eq!(report.completed, 0);
    assert!(!report.cancelled);
    Ok(())
}

#[tokio::test]
async fn ledger_file_is_written_as_json() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let runner = Arc::new(FakeScriptRunner::new().on("backup-roles", FakeScript::Fail("nope".to_string())));

    let report = with_timeout(orchestrator(runner, &root).spawn(switches_and_roles()).wait()).await?;
    let path = root.path().join("ledgers").join("run.json");
    report.write_ledger(&path)?;

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(json["total"], 2);
    assert_eq!(json["ledger"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(json["ledger"][0]["operation"], "switches");
    assert_eq!(json["tasks"][1]["status"], "failed");
    Ok(())
}
