pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod parser;
pub mod worker;

pub use crate::core::{
    Conflict, ExecutionResult, Phase, PlanTree, TaskId, TaskNode, TaskState, WorkerKind,
};
pub use error::{Error, Result};
pub use parser::PlanParser;
