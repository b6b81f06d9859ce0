use crate::core::plan::Conflict;
use crate::core::task::TaskId;
use thiserror::Error;

/// Plan document rejections, raised before any task is dispatched.
///
/// Every variant identifies the offending node or tree so the caller
/// can fix the document without re-running.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("task id '{id}' is not a valid slug (expected [a-z0-9][a-z0-9_-]*)")]
    InvalidTaskId { id: String },

    #[error("duplicate task id: {id}")]
    DuplicateTask { id: TaskId },

    #[error("task {task}: missing worker type")]
    MissingWorker { task: TaskId },

    #[error("task {task}: unknown worker type '{tag}'")]
    UnknownWorker { task: TaskId, tag: String },

    #[error("task {task}: missing or empty scope")]
    MissingScope { task: TaskId },

    #[error("plan '{tree}': duplicate phase index {index}")]
    DuplicatePhase { tree: String, index: u32 },

    #[error("plan '{tree}': phase {index} has no tasks")]
    EmptyPhase { tree: String, index: u32 },

    #[error("plan '{tree}': phases must be contiguous from 1 (expected {expected}, found {found})")]
    NonContiguousPhases {
        tree: String,
        expected: u32,
        found: u32,
    },

    #[error("task {task}: cyclic phase reference")]
    CyclicPhases { task: TaskId },

    #[error("recursive task {task} has no matching [subplan.{task}] definition")]
    MissingSubPlan { task: TaskId },

    #[error("sub-plan '{name}' is not referenced by any recursive task")]
    OrphanSubPlan { name: String },

    #[error("task {task}: nesting depth {depth} exceeds the maximum of {max}")]
    DepthExceeded { task: TaskId, depth: u8, max: u8 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("invalid plan: {0}")]
    Parse(#[from] ParseError),

    #[error("file claim conflict: {0}")]
    Conflict(Conflict),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Worker command not available: {0}")]
    WorkerNotAvailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
