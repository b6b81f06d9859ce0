//! Failure policy: blocking failures drain the phase and halt the
//! tree; non-blocking failures are recorded and execution continues.

use std::sync::Arc;

use parallx::orchestration::{Aggregator, Scheduler, TreeState, VerificationStatus};
use parallx::{PlanParser, TaskId, TaskState};

use crate::fixtures::{StubRunner, TimelineEvent};

const MIXED_PLAN: &str = r#"
name = "mixed"

[[phase]]
index = 1

[[phase.task]]
id = "critical"
worker = "backend"
scope = "must succeed"

[[phase.task]]
id = "advisory"
worker = "infra"
scope = "best effort"
blocking = false

[[phase]]
index = 2

[[phase.task]]
id = "downstream"
worker = "backend"
scope = "depends on phase 1"
"#;

#[tokio::test]
async fn test_blocking_failure_halts_after_phase_drains() {
    let runner = Arc::new(
        StubRunner::new()
            .fail("critical", "compile error")
            .delay("advisory", 30),
    );
    let timeline = runner.timeline.clone();

    let tree = PlanParser::default().parse_str(MIXED_PLAN).unwrap();
    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    assert_eq!(outcome.state, TreeState::Failed);

    // The slow sibling still drains; it is never killed.
    timeline.assert_before(
        TimelineEvent::Finished(TaskId::new("critical")),
        TimelineEvent::Finished(TaskId::new("advisory")),
    );
    assert!(outcome
        .result_for(&TaskId::new("advisory"))
        .unwrap()
        .is_success());

    // Downstream is recorded as skipped, never dispatched.
    assert!(matches!(
        outcome.result_for(&TaskId::new("downstream")).unwrap().state,
        TaskState::Skipped { .. }
    ));
    assert!(!timeline
        .dispatch_order()
        .contains(&TaskId::new("downstream")));
}

#[tokio::test]
async fn test_non_blocking_failure_does_not_halt() {
    let runner = Arc::new(StubRunner::new().fail("advisory", "lint warnings"));
    let tree = PlanParser::default().parse_str(MIXED_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    assert_eq!(outcome.state, TreeState::Completed);
    assert!(outcome
        .result_for(&TaskId::new("advisory"))
        .unwrap()
        .is_failure());
    assert!(outcome
        .result_for(&TaskId::new("downstream"))
        .unwrap()
        .is_success());
}

#[tokio::test]
async fn test_failure_preserves_error_detail() {
    let runner = Arc::new(StubRunner::new().fail("critical", "worker exited with code 2"));
    let tree = PlanParser::default().parse_str(MIXED_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    let result = outcome.result_for(&TaskId::new("critical")).unwrap();
    assert!(matches!(
        result.state,
        TaskState::Failed { ref error } if error == "worker exited with code 2"
    ));
}

#[tokio::test]
async fn test_failed_tree_report_skips_verification() {
    let runner = Arc::new(StubRunner::new().fail("critical", "boom"));
    let tree = PlanParser::default().parse_str(MIXED_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();
    // A verify command is configured, but the tree failed.
    let report = Aggregator::new(Some("true".to_string()))
        .aggregate(&tree, outcome)
        .await
        .unwrap();

    assert_eq!(report.state, TreeState::Failed);
    assert!(matches!(
        report.verification,
        VerificationStatus::Skipped { .. }
    ));
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_completed_tree_runs_verification_once() {
    let runner = Arc::new(StubRunner::new());
    let tree = PlanParser::default().parse_str(MIXED_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();
    let report = Aggregator::new(Some("true".to_string()))
        .aggregate(&tree, outcome)
        .await
        .unwrap();

    assert_eq!(report.verification, VerificationStatus::Passed);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_two_blocking_failures_in_one_phase() {
    let plan = r#"
name = "double"

[[phase]]
index = 1
[[phase.task]]
id = "one"
worker = "backend"
scope = "first"
[[phase.task]]
id = "two"
worker = "backend"
scope = "second"

[[phase]]
index = 2
[[phase.task]]
id = "three"
worker = "backend"
scope = "third"
"#;
    let runner = Arc::new(StubRunner::new().fail("one", "a").fail("two", "b"));
    let tree = PlanParser::default().parse_str(plan).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    assert_eq!(outcome.state, TreeState::Failed);
    // Both failures recorded, single skip for the downstream task.
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.result_for(&TaskId::new("one")).unwrap().is_failure());
    assert!(outcome.result_for(&TaskId::new("two")).unwrap().is_failure());
    assert!(matches!(
        outcome.result_for(&TaskId::new("three")).unwrap().state,
        TaskState::Skipped { .. }
    ));
}
