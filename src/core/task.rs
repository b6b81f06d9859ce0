//! Task data model for phased plan execution.
//!
//! Tasks are the atomic units of work dispatched to workers. Each task
//! declares its worker capability, scope, file claims, and the phase it
//! belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a task node within a plan tree.
///
/// Task ids are human-assigned slugs declared in the plan document
/// (e.g. `api-models`). The parser enforces the slug format and
/// uniqueness across the whole tree, including sub-trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Wrap a raw slug as a task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Worker capability assigned to a task.
///
/// The set is closed and resolved once at parse time; the scheduler
/// never matches on raw tag strings. `Recursive` marks a task that is
/// expanded into a nested plan tree instead of being executed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// UI and client-side work.
    Frontend,
    /// Server-side and API work.
    Backend,
    /// Investigation tasks that produce notes rather than code.
    Research,
    /// Build, tooling, and deployment work.
    Infra,
    /// Expanded into a nested plan tree by the scheduler.
    Recursive,
}

impl WorkerKind {
    /// All known worker tags, in declaration order.
    pub const ALL: [WorkerKind; 5] = [
        WorkerKind::Frontend,
        WorkerKind::Backend,
        WorkerKind::Research,
        WorkerKind::Infra,
        WorkerKind::Recursive,
    ];

    /// Return the canonical tag string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Frontend => "frontend",
            WorkerKind::Backend => "backend",
            WorkerKind::Research => "research",
            WorkerKind::Infra => "infra",
            WorkerKind::Recursive => "recursive",
        }
    }

    /// Resolve a raw tag from a plan document, if it names a known kind.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == tag)
    }

    /// Whether tasks with this tag expand into a nested plan tree.
    pub fn is_recursive(&self) -> bool {
        matches!(self, WorkerKind::Recursive)
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_blocking() -> bool {
    true
}

/// A single unit of work in the plan tree.
///
/// File claims declare exclusive write access within the task's phase.
/// Exclusivity is enforced by pre-validation only, not by a runtime
/// lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique identifier within the whole tree.
    pub id: TaskId,
    /// Worker capability resolved at parse time.
    pub worker: WorkerKind,
    /// Free-text description of what the worker should do.
    pub scope: String,
    /// File paths this task claims exclusive write access to.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// 1-based phase index within the owning tree.
    pub phase: u32,
    /// Whether a failure of this task halts the tree. Defaults to true.
    #[serde(default = "default_blocking")]
    pub blocking: bool,
}

impl TaskNode {
    /// Create a task with the default blocking policy and no file claims.
    pub fn new(id: impl Into<TaskId>, worker: WorkerKind, scope: &str, phase: u32) -> Self {
        Self {
            id: id.into(),
            worker,
            scope: scope.to_string(),
            files: Vec::new(),
            phase,
            blocking: true,
        }
    }

    /// Set the file claims for this task.
    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    /// Mark this task as non-blocking (failure does not halt the tree).
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    /// Whether the scheduler expands this task into a nested plan tree.
    pub fn is_recursive(&self) -> bool {
        self.worker.is_recursive()
    }
}

/// Terminal state of one executed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    /// Task completed successfully.
    Succeeded,
    /// Task failed with an error.
    Failed {
        /// Error detail from the worker or child tree.
        error: String,
    },
    /// Task was never dispatched because an earlier blocking failure
    /// halted the tree.
    Skipped {
        /// Why the task was skipped.
        reason: String,
    },
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed { error } => write!(f, "failed: {}", error),
            TaskState::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// Outcome record appended to the scheduler's run log when a task
/// reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The task this outcome belongs to.
    pub task_id: TaskId,
    /// Terminal state the task reached.
    pub state: TaskState,
    /// File paths the worker reported touching.
    pub files_touched: Vec<PathBuf>,
    /// When the task was dispatched. None for skipped tasks.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached its terminal state. None for skipped tasks.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    /// Record a successful task.
    pub fn succeeded(
        task_id: TaskId,
        files_touched: Vec<PathBuf>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            state: TaskState::Succeeded,
            files_touched,
            started_at: Some(started_at),
            finished_at: Some(finished_at),
        }
    }

    /// Record a failed task.
    pub fn failed(
        task_id: TaskId,
        error: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            state: TaskState::Failed {
                error: error.to_string(),
            },
            files_touched: Vec::new(),
            started_at: Some(started_at),
            finished_at: Some(finished_at),
        }
    }

    /// Record a task that was never dispatched.
    pub fn skipped(task_id: TaskId, reason: &str) -> Self {
        Self {
            task_id,
            state: TaskState::Skipped {
                reason: reason.to_string(),
            },
            files_touched: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether the task succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.state, TaskState::Succeeded)
    }

    /// Whether the task failed (skipped tasks are not failures).
    pub fn is_failure(&self) -> bool {
        matches!(self.state, TaskState::Failed { .. })
    }
}
