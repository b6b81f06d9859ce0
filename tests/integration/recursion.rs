//! Recursive expansion: sub-plans run inside the parent's phase, depth
//! is bounded at parse time, and child failures fold into a single
//! parent task failure.

use std::sync::Arc;

use parallx::error::{Error, ParseError};
use parallx::orchestration::{Aggregator, Scheduler, TreeState};
use parallx::{PlanParser, TaskId, TaskState};

use crate::fixtures::{StubRunner, TimelineEvent, RECURSIVE_PLAN};

#[tokio::test]
async fn test_subtree_runs_within_parent_phase() {
    let runner = Arc::new(StubRunner::new());
    let timeline = runner.timeline.clone();

    let tree = PlanParser::default().parse_str(RECURSIVE_PLAN).unwrap();
    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    assert_eq!(outcome.state, TreeState::Completed);

    // The sub-plan's phases observe their own barrier.
    timeline.assert_before(
        TimelineEvent::Finished(TaskId::new("cart-view")),
        TimelineEvent::Dispatched(TaskId::new("cart-wire")),
    );
    timeline.assert_before(
        TimelineEvent::Finished(TaskId::new("cart-api")),
        TimelineEvent::Dispatched(TaskId::new("cart-wire")),
    );

    // The root's phase-2 task waits for the whole sub-tree.
    timeline.assert_before(
        TimelineEvent::Finished(TaskId::new("cart-wire")),
        TimelineEvent::Dispatched(TaskId::new("ship")),
    );
}

#[tokio::test]
async fn test_subtree_runs_concurrently_with_phase_siblings() {
    // api-docs shares phase 1 with the recursive task; it should be
    // dispatched without waiting for the sub-tree.
    let runner = Arc::new(StubRunner::new().delay("cart-view", 30));
    let timeline = runner.timeline.clone();

    let tree = PlanParser::default().parse_str(RECURSIVE_PLAN).unwrap();
    Scheduler::new(runner).run(&tree).await.unwrap();

    timeline.assert_before(
        TimelineEvent::Dispatched(TaskId::new("api-docs")),
        TimelineEvent::Finished(TaskId::new("cart-view")),
    );
}

#[tokio::test]
async fn test_parent_result_unions_child_files() {
    let runner = Arc::new(StubRunner::new());
    let tree = PlanParser::default().parse_str(RECURSIVE_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    let parent = outcome.result_for(&TaskId::new("checkout-ui")).unwrap();
    assert!(parent.is_success());
    let files: Vec<String> = parent
        .files_touched
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    assert_eq!(
        files,
        vec!["src/cart.tsx", "src/cart_api.rs", "src/cart_wiring.tsx"]
    );
}

#[tokio::test]
async fn test_child_failure_becomes_one_parent_failure() {
    let runner = Arc::new(StubRunner::new().fail("cart-api", "endpoint broke"));
    let tree = PlanParser::default().parse_str(RECURSIVE_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    assert_eq!(outcome.state, TreeState::Failed);

    // The child's own record keeps the real error; the parent records
    // a single folded failure.
    let child = outcome.result_for(&TaskId::new("cart-api")).unwrap();
    assert!(matches!(
        child.state,
        TaskState::Failed { ref error } if error == "endpoint broke"
    ));
    let parent = outcome.result_for(&TaskId::new("checkout-ui")).unwrap();
    assert!(matches!(
        parent.state,
        TaskState::Failed { ref error } if error == "sub-plan failed"
    ));

    // Root phase 2 never ran.
    assert!(matches!(
        outcome.result_for(&TaskId::new("ship")).unwrap().state,
        TaskState::Skipped { .. }
    ));
}

#[tokio::test]
async fn test_report_includes_every_subtree_task() {
    let runner = Arc::new(StubRunner::new());
    let tree = PlanParser::default().parse_str(RECURSIVE_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();
    let report = Aggregator::without_verification()
        .aggregate(&tree, outcome)
        .await
        .unwrap();

    // 3 sub-tree tasks + checkout-ui + api-docs + ship.
    assert_eq!(report.results.len(), 6);
    assert_eq!(report.succeeded_count(), 6);
}

#[test]
fn test_depth_overflow_rejected_before_any_dispatch() {
    let plan = r#"
name = "too-deep"

[[phase]]
index = 1
[[phase.task]]
id = "l1"
worker = "recursive"
scope = "one"

[subplan.l1]
[[subplan.l1.phase]]
index = 1
[[subplan.l1.phase.task]]
id = "l2"
worker = "recursive"
scope = "two"

[subplan.l1.subplan.l2]
[[subplan.l1.subplan.l2.phase]]
index = 1
[[subplan.l1.subplan.l2.phase.task]]
id = "l3"
worker = "recursive"
scope = "three"

[subplan.l1.subplan.l2.subplan.l3]
[[subplan.l1.subplan.l2.subplan.l3.phase]]
index = 1
[[subplan.l1.subplan.l2.subplan.l3.phase.task]]
id = "leaf"
worker = "backend"
scope = "never runs"
"#;
    let err = PlanParser::default().parse_str(plan).unwrap_err();
    assert!(matches!(
        err,
        Error::Parse(ParseError::DepthExceeded { depth: 3, max: 2, .. })
    ));
}

#[test]
fn test_custom_depth_limit_is_honored() {
    // With max_depth 0 even a single sub-plan is too deep.
    let err = PlanParser::new(0).parse_str(RECURSIVE_PLAN).unwrap_err();
    assert!(matches!(
        err,
        Error::Parse(ParseError::DepthExceeded { depth: 1, max: 0, .. })
    ));
}
