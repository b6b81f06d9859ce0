//! Phase-barrier correctness: tasks in one phase run concurrently,
//! and no task starts before every lower-indexed phase has drained.

use std::sync::Arc;

use parallx::orchestration::{Scheduler, TreeState};
use parallx::{PlanParser, TaskId};

use crate::fixtures::{StubRunner, TimelineEvent, TWO_PHASE_PLAN};

#[tokio::test]
async fn test_dependent_task_waits_for_whole_phase() {
    // task-a is slow; the barrier must still hold task-c until both
    // phase-1 tasks finish.
    let runner = Arc::new(StubRunner::new().delay("task-a", 40));
    let timeline = runner.timeline.clone();

    let tree = PlanParser::default().parse_str(TWO_PHASE_PLAN).unwrap();
    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    assert_eq!(outcome.state, TreeState::Completed);
    timeline.assert_before(
        TimelineEvent::Finished(TaskId::new("task-a")),
        TimelineEvent::Dispatched(TaskId::new("task-c")),
    );
    timeline.assert_before(
        TimelineEvent::Finished(TaskId::new("task-b")),
        TimelineEvent::Dispatched(TaskId::new("task-c")),
    );
}

#[tokio::test]
async fn test_phase_siblings_overlap() {
    // Both phase-1 tasks are dispatched before either finishes: they
    // genuinely run concurrently rather than in sequence.
    let runner = Arc::new(StubRunner::new().delay("task-a", 25).delay("task-b", 25));
    let timeline = runner.timeline.clone();

    let tree = PlanParser::default().parse_str(TWO_PHASE_PLAN).unwrap();
    Scheduler::new(runner).run(&tree).await.unwrap();

    timeline.assert_before(
        TimelineEvent::Dispatched(TaskId::new("task-a")),
        TimelineEvent::Finished(TaskId::new("task-a")),
    );
    timeline.assert_before(
        TimelineEvent::Dispatched(TaskId::new("task-b")),
        TimelineEvent::Finished(TaskId::new("task-a")),
    );
    timeline.assert_before(
        TimelineEvent::Dispatched(TaskId::new("task-b")),
        TimelineEvent::Finished(TaskId::new("task-b")),
    );
}

#[tokio::test]
async fn test_three_phases_dispatch_in_order() {
    let plan = r#"
name = "pipeline"

[[phase]]
index = 1
[[phase.task]]
id = "build"
worker = "infra"
scope = "build"

[[phase]]
index = 2
[[phase.task]]
id = "test"
worker = "infra"
scope = "test"

[[phase]]
index = 3
[[phase.task]]
id = "deploy"
worker = "infra"
scope = "deploy"
"#;
    let runner = Arc::new(StubRunner::new());
    let timeline = runner.timeline.clone();

    let tree = PlanParser::default().parse_str(plan).unwrap();
    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    assert_eq!(outcome.state, TreeState::Completed);
    assert_eq!(
        timeline.dispatch_order(),
        vec![
            TaskId::new("build"),
            TaskId::new("test"),
            TaskId::new("deploy")
        ]
    );
}

#[tokio::test]
async fn test_results_carry_reported_files() {
    let runner = Arc::new(StubRunner::new());
    let tree = PlanParser::default().parse_str(TWO_PHASE_PLAN).unwrap();

    let outcome = Scheduler::new(runner).run(&tree).await.unwrap();

    let result = outcome.result_for(&TaskId::new("task-a")).unwrap();
    assert!(result.is_success());
    assert_eq!(
        result.files_touched,
        vec![std::path::PathBuf::from("file1.txt")]
    );
    assert!(result.started_at.is_some());
    assert!(result.finished_at.is_some());
}
