// tests/property_workflow.rs

use std::sync::Arc;

use proptest::prelude::*;

use vimigrate::exec::{OutputLine, ProgressProtocol};
use vimigrate::workflow::{Operation, TaskStatus, WorkflowEvent, WorkflowOrchestrator};
use vimigrate::session::SessionState;
use vimigrate_test_utils::fake_runner::{FakeScript, FakeScriptRunner};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

proptest! {
    // Any mix of failing and succeeding tasks runs to the end: every task is
    // terminal, the completed counter reaches the total and the ledger holds
    // exactly the successes, in order.
    #[test]
    fn every_task_reaches_a_terminal_state(outcomes in proptest::collection::vec(any::<bool>(), 0..8)) {
        let root = tempfile::tempdir().expect("tempdir");

        let mut runner = FakeScriptRunner::new();
        let mut ops = Vec::new();
        for (i, ok) in outcomes.iter().enumerate() {
            let script = format!("op-{i}");
            if !ok {
                runner = runner.on(&script, FakeScript::Fail(format!("op {i} failed")));
            }
            ops.push(Operation::inline(format!("task_{i}"), script));
        }

        let orch = WorkflowOrchestrator::new(Arc::new(runner), SessionState::new(), root.path());
        let (report, events) = runtime().block_on(async move {
            let mut handle = orch.spawn(ops);
            let mut events = Vec::new();
            while let Some(ev) = handle.next_event().await {
                events.push(ev);
            }
            (handle.wait().await, events)
        });
        let report = report.expect("fake runner never fails the session");

        prop_assert_eq!(report.total, outcomes.len());
        prop_assert_eq!(report.completed, outcomes.len());
        prop_assert!(!report.cancelled);
        for (task, ok) in report.tasks.iter().zip(&outcomes) {
            let expected = if *ok { TaskStatus::Completed } else { TaskStatus::Failed };
            prop_assert_eq!(task.status(), expected);
            prop_assert!(task.end_time() >= task.start_time());
        }

        let expected_ledger: Vec<String> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, ok)| **ok)
            .map(|(i, _)| format!("task_{i}"))
            .collect();
        let ledger: Vec<String> = report.ledger().into_iter().map(|e| e.operation).collect();
        prop_assert_eq!(ledger, expected_ledger);

        let overall: Vec<f64> = events
            .iter()
            .filter_map(|ev| match ev {
                WorkflowEvent::OverallProgress { percentage, .. } => Some(*percentage),
                _ => None,
            })
            .collect();
        prop_assert!(overall.windows(2).all(|w| w[0] <= w[1]));
        if !outcomes.is_empty() {
            prop_assert_eq!(overall.last().copied(), Some(100.0));
        }
    }

    // Reported progress of one task never goes backwards, whatever order
    // the script prints percentages in.
    #[test]
    fn task_progress_is_monotonic(percents in proptest::collection::vec(0u16..=150, 1..10)) {
        let root = tempfile::tempdir().expect("tempdir");
        let lines: Vec<String> = percents
            .iter()
            .map(|p| format!("PROGRESS:{p}% step"))
            .collect();
        let runner = FakeScriptRunner::new().on("work", FakeScript::Succeed(lines));
        let orch = WorkflowOrchestrator::new(Arc::new(runner), SessionState::new(), root.path());

        let events = runtime().block_on(async move {
            let mut handle = orch.spawn(vec![Operation::inline("work", "work")]);
            let mut events = Vec::new();
            while let Some(ev) = handle.next_event().await {
                events.push(ev);
            }
            events
        });

        let reported: Vec<u8> = events
            .iter()
            .filter_map(|ev| match ev {
                WorkflowEvent::TaskProgress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        prop_assert_eq!(reported.len(), percents.len());
        prop_assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(reported.iter().all(|p| *p <= 100));
    }

    // Every non-blank stdout line is exactly one of progress or log, and
    // classification keeps line order.
    #[test]
    fn classification_partitions_lines(lines in proptest::collection::vec("(PROGRESS:)?[ a-zA-Z0-9%:]{0,20}", 0..20)) {
        let protocol = ProgressProtocol::default();
        let block = lines.join("\n");
        let classified = protocol.classify_output(&block);

        let non_blank: Vec<&String> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
        prop_assert_eq!(classified.len(), non_blank.len());

        for (line, out) in non_blank.iter().zip(&classified) {
            match out {
                OutputLine::Progress(_) => prop_assert!(line.trim().starts_with("PROGRESS:")),
                OutputLine::Log(text) => {
                    prop_assert!(!line.trim().starts_with("PROGRESS:"));
                    prop_assert_eq!(text.as_str(), line.trim());
                }
                OutputLine::Error(_) => prop_assert!(false, "stdout never yields errors"),
            }
        }
    }
}
