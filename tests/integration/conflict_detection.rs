//! File claim conflict detection: the pre-flight gate in the parser
//! and the advisory post-hoc scan in the aggregator.

use std::path::PathBuf;
use std::sync::Arc;

use parallx::orchestration::{Aggregator, Scheduler};
use parallx::{Error, PlanParser, TaskId};

use crate::fixtures::StubRunner;

const OVERLAPPING_PLAN: &str = r#"
name = "collide"

[[phase]]
index = 1

[[phase.task]]
id = "task-a"
worker = "backend"
scope = "Edit the model"
files = ["src/model.rs", "src/schema.rs"]

[[phase.task]]
id = "task-b"
worker = "backend"
scope = "Edit the model differently"
files = ["src/model.rs", "src/schema.rs"]
"#;

#[test]
fn test_parser_rejects_overlapping_claims() {
    let err = PlanParser::default().parse_str(OVERLAPPING_PLAN).unwrap_err();

    match err {
        Error::Conflict(conflict) => {
            assert_eq!(conflict.phase, 1);
            assert_eq!(conflict.first, TaskId::new("task-a"));
            assert_eq!(conflict.second, TaskId::new("task-b"));
            // One conflict per pair, carrying every shared path.
            assert_eq!(
                conflict.paths,
                vec![PathBuf::from("src/model.rs"), PathBuf::from("src/schema.rs")]
            );
        }
        other => panic!("expected a conflict, got {:?}", other),
    }
}

#[test]
fn test_check_reports_every_pair() {
    let plan = r#"
name = "three-way"

[[phase]]
index = 1

[[phase.task]]
id = "task-a"
worker = "backend"
scope = "a"
files = ["shared.rs"]

[[phase.task]]
id = "task-b"
worker = "backend"
scope = "b"
files = ["shared.rs"]

[[phase.task]]
id = "task-c"
worker = "backend"
scope = "c"
files = ["shared.rs"]
"#;
    let (_, conflicts) = PlanParser::default().check_str(plan).unwrap();
    assert_eq!(conflicts.len(), 3);
}

#[test]
fn test_subtree_claims_conflict_with_parent_phase_sibling() {
    // The recursive task itself claims nothing, but its sub-tree
    // writes notes.md, which a phase sibling also claims.
    let plan = r#"
name = "leaky"

[[phase]]
index = 1

[[phase.task]]
id = "nested"
worker = "recursive"
scope = "sub work"

[[phase.task]]
id = "writer"
worker = "research"
scope = "write notes"
files = ["notes.md"]

[subplan.nested]
[[subplan.nested.phase]]
index = 1
[[subplan.nested.phase.task]]
id = "inner"
worker = "backend"
scope = "also write notes"
files = ["notes.md"]
"#;
    let err = PlanParser::default().parse_str(plan).unwrap_err();
    match err {
        Error::Conflict(conflict) => {
            assert_eq!(conflict.first, TaskId::new("nested"));
            assert_eq!(conflict.second, TaskId::new("writer"));
            assert_eq!(conflict.paths, vec![PathBuf::from("notes.md")]);
        }
        other => panic!("expected a conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_post_hoc_scan_is_advisory() {
    // Bypass the parser gate by scanning a tree built from a
    // conflict-free document, then aggregate: no conflicts recorded.
    let clean = r#"
name = "clean"

[[phase]]
index = 1

[[phase.task]]
id = "task-a"
worker = "backend"
scope = "a"
files = ["a.rs"]

[[phase.task]]
id = "task-b"
worker = "backend"
scope = "b"
files = ["b.rs"]
"#;
    let tree = PlanParser::default().parse_str(clean).unwrap();
    let outcome = Scheduler::new(Arc::new(StubRunner::new()))
        .run(&tree)
        .await
        .unwrap();

    let report = Aggregator::without_verification()
        .aggregate(&tree, outcome)
        .await
        .unwrap();

    assert!(report.conflicts.is_empty());
    assert!(report.is_success());
}
