//! Phase-barrier scheduler.
//!
//! Drives one plan tree to completion: dispatches every task of the
//! lowest non-drained phase concurrently, waits for the whole phase to
//! drain, then releases the next one. Recursive tasks are expanded
//! in-place into a child scheduler run over their sub-tree; the child
//! tree must complete before the parent phase's barrier lifts.
//!
//! Failure policy: a failed blocking task lets its phase siblings
//! drain, then halts the tree and records every undispatched task as
//! skipped. Non-blocking failures are recorded and execution continues.

use crate::core::dag::TaskGraph;
use crate::core::plan::PlanTree;
use crate::core::task::{ExecutionResult, TaskId, TaskNode};
use crate::error::Result;
use crate::orchestration::runner::TaskRunner;
use crate::{plog, plog_debug, plog_error, plog_warn};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Lifecycle state of one tree run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeState {
    /// Not yet started.
    Pending,
    /// A phase is currently dispatching or draining.
    Running,
    /// Every task reached a terminal state with no blocking failure.
    Completed,
    /// A blocking task failed and the tree was halted.
    Failed,
}

impl std::fmt::Display for TreeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeState::Pending => write!(f, "pending"),
            TreeState::Running => write!(f, "running"),
            TreeState::Completed => write!(f, "completed"),
            TreeState::Failed => write!(f, "failed"),
        }
    }
}

/// Progress notifications emitted while a tree runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    PhaseStarted {
        tree: String,
        phase: u32,
        task_count: usize,
    },
    TaskStarted {
        tree: String,
        task: TaskId,
    },
    TaskCompleted {
        tree: String,
        task: TaskId,
    },
    TaskFailed {
        tree: String,
        task: TaskId,
        error: String,
    },
    TaskSkipped {
        tree: String,
        task: TaskId,
        reason: String,
    },
    TreeCompleted {
        tree: String,
    },
    TreeFailed {
        tree: String,
    },
}

/// Outcome of driving one tree (and its sub-trees) to termination.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeOutcome {
    /// Terminal state of the tree.
    pub state: TreeState,
    /// Append-only run log: one record per task that reached a
    /// terminal state, child-tree records before their parent's.
    pub results: Vec<ExecutionResult>,
}

impl TreeOutcome {
    /// Look up the record for one task.
    pub fn result_for(&self, id: &TaskId) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| &r.task_id == id)
    }
}

/// What one in-flight phase task resolved to.
struct PhaseTaskOutcome {
    result: ExecutionResult,
    blocking: bool,
    /// Run log of the child tree, when the task was recursive.
    child_results: Vec<ExecutionResult>,
}

/// Drives plan trees phase by phase through a [`TaskRunner`].
#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn TaskRunner>,
    events: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            runner,
            events: None,
        }
    }

    /// Attach an event channel for progress reporting.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.events {
            // Receiver may have been dropped; progress is best-effort.
            let _ = tx.send(event);
        }
    }

    /// Run a tree to termination.
    ///
    /// Recursive tasks spawn a child run over their sub-tree within
    /// the parent's phase; the child's outcome becomes the parent
    /// task's terminal state and its run log is folded into the
    /// returned one.
    pub async fn run(&self, tree: &PlanTree) -> Result<TreeOutcome> {
        self.run_tree(tree.clone()).await
    }

    fn run_tree(&self, tree: PlanTree) -> BoxFuture<'_, Result<TreeOutcome>> {
        async move {
            let graph = TaskGraph::from_tree(&tree)?;
            let mut terminal: HashSet<TaskId> = HashSet::new();
            let mut results: Vec<ExecutionResult> = Vec::new();
            let mut halted = false;

            plog!(
                "tree '{}': starting, {} phases, {} tasks",
                tree.name,
                tree.phase_count(),
                tree.task_count()
            );

            while !halted && !graph.all_terminal(&terminal) {
                let ready: Vec<TaskNode> = graph
                    .ready_tasks(&terminal)
                    .into_iter()
                    .cloned()
                    .collect();

                // Barrier edges guarantee readiness drains phase by
                // phase; an empty ready set with pending tasks would
                // mean a broken graph.
                let phase = match ready.first() {
                    Some(task) => task.phase,
                    None => break,
                };

                self.emit(SchedulerEvent::PhaseStarted {
                    tree: tree.name.clone(),
                    phase,
                    task_count: ready.len(),
                });
                plog!(
                    "tree '{}': phase {} dispatching {} task(s)",
                    tree.name,
                    phase,
                    ready.len()
                );

                let mut in_flight: JoinSet<PhaseTaskOutcome> = JoinSet::new();
                let mut spawned: HashMap<tokio::task::Id, (TaskId, bool)> = HashMap::new();
                for task in ready {
                    self.emit(SchedulerEvent::TaskStarted {
                        tree: tree.name.clone(),
                        task: task.id.clone(),
                    });

                    let spawn_key = (task.id.clone(), task.blocking);
                    let handle = if task.is_recursive() {
                        let sub = tree.subplan(&task.id).cloned();
                        let scheduler = self.clone();
                        in_flight.spawn(async move { scheduler.expand(sub, task).await })
                    } else {
                        let runner = Arc::clone(&self.runner);
                        in_flight.spawn(async move {
                            let started = Utc::now();
                            let outcome = runner.run(&task).await;
                            let finished = Utc::now();
                            let result = match outcome {
                                Ok(report) => ExecutionResult::succeeded(
                                    task.id.clone(),
                                    report.files_touched,
                                    started,
                                    finished,
                                ),
                                Err(error) => ExecutionResult::failed(
                                    task.id.clone(),
                                    &error,
                                    started,
                                    finished,
                                ),
                            };
                            PhaseTaskOutcome {
                                result,
                                blocking: task.blocking,
                                child_results: Vec::new(),
                            }
                        })
                    };
                    spawned.insert(handle.id(), spawn_key);
                }

                // The whole phase drains before the barrier lifts. A
                // blocking failure never interrupts its siblings.
                while let Some(joined) = in_flight.join_next_with_id().await {
                    let outcome = match joined {
                        Ok((_, outcome)) => outcome,
                        Err(join_err) => {
                            let (task_id, blocking) = spawned
                                .get(&join_err.id())
                                .cloned()
                                .unwrap_or_else(|| (TaskId::new("unknown"), true));
                            plog_error!(
                                "tree '{}': task {} panicked",
                                tree.name,
                                task_id
                            );
                            PhaseTaskOutcome {
                                result: ExecutionResult::failed(
                                    task_id,
                                    &format!("task panicked: {}", join_err),
                                    Utc::now(),
                                    Utc::now(),
                                ),
                                blocking,
                                child_results: Vec::new(),
                            }
                        }
                    };

                    terminal.insert(outcome.result.task_id.clone());
                    match &outcome.result.state {
                        crate::core::task::TaskState::Succeeded => {
                            self.emit(SchedulerEvent::TaskCompleted {
                                tree: tree.name.clone(),
                                task: outcome.result.task_id.clone(),
                            });
                            plog_debug!(
                                "tree '{}': task {} succeeded",
                                tree.name,
                                outcome.result.task_id
                            );
                        }
                        crate::core::task::TaskState::Failed { error } => {
                            self.emit(SchedulerEvent::TaskFailed {
                                tree: tree.name.clone(),
                                task: outcome.result.task_id.clone(),
                                error: error.clone(),
                            });
                            if outcome.blocking {
                                plog_error!(
                                    "tree '{}': blocking task {} failed: {}",
                                    tree.name,
                                    outcome.result.task_id,
                                    error
                                );
                                halted = true;
                            } else {
                                plog_warn!(
                                    "tree '{}': non-blocking task {} failed: {}",
                                    tree.name,
                                    outcome.result.task_id,
                                    error
                                );
                            }
                        }
                        crate::core::task::TaskState::Skipped { .. } => {}
                    }

                    results.extend(outcome.child_results);
                    results.push(outcome.result);
                }
            }

            let state = if halted {
                // Everything not yet terminal in this tree was never
                // dispatched.
                for task in tree.all_tasks() {
                    if !terminal.contains(&task.id) {
                        let reason = "halted by earlier blocking failure";
                        self.emit(SchedulerEvent::TaskSkipped {
                            tree: tree.name.clone(),
                            task: task.id.clone(),
                            reason: reason.to_string(),
                        });
                        results.push(ExecutionResult::skipped(task.id.clone(), reason));
                    }
                }
                self.emit(SchedulerEvent::TreeFailed {
                    tree: tree.name.clone(),
                });
                plog_error!("tree '{}': failed", tree.name);
                TreeState::Failed
            } else {
                self.emit(SchedulerEvent::TreeCompleted {
                    tree: tree.name.clone(),
                });
                plog!("tree '{}': completed", tree.name);
                TreeState::Completed
            };

            Ok(TreeOutcome { state, results })
        }
        .boxed()
    }

    /// Expand a recursive task: run its sub-tree to termination and
    /// fold the child outcome into a single terminal state for the
    /// parent task.
    async fn expand(&self, sub: Option<PlanTree>, task: TaskNode) -> PhaseTaskOutcome {
        let started = Utc::now();
        // Parser guarantees the sub-tree exists for every recursive
        // task.
        let sub = match sub {
            Some(sub) => sub,
            None => {
                return PhaseTaskOutcome {
                    result: ExecutionResult::failed(
                        task.id.clone(),
                        "recursive task has no sub-plan",
                        started,
                        Utc::now(),
                    ),
                    blocking: task.blocking,
                    child_results: Vec::new(),
                }
            }
        };

        match self.run_tree(sub).await {
            Ok(child) => {
                let finished = Utc::now();
                let result = match child.state {
                    TreeState::Completed => {
                        // The parent task's footprint is its sub-tree's
                        // combined footprint.
                        let mut files: Vec<_> = child
                            .results
                            .iter()
                            .flat_map(|r| r.files_touched.iter().cloned())
                            .collect();
                        files.sort();
                        files.dedup();
                        ExecutionResult::succeeded(task.id.clone(), files, started, finished)
                    }
                    _ => ExecutionResult::failed(
                        task.id.clone(),
                        "sub-plan failed",
                        started,
                        finished,
                    ),
                };
                PhaseTaskOutcome {
                    result,
                    blocking: task.blocking,
                    child_results: child.results,
                }
            }
            Err(e) => PhaseTaskOutcome {
                result: ExecutionResult::failed(
                    task.id.clone(),
                    &format!("sub-plan error: {}", e),
                    started,
                    Utc::now(),
                ),
                blocking: task.blocking,
                child_results: Vec::new(),
            },
        }
    }
}
