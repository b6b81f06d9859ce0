//! Core domain models for parallx orchestration.
//!
//! This module contains the fundamental data structures used throughout
//! the engine: tasks, plan trees, and the barrier graph.

pub mod dag;
pub mod plan;
pub mod task;

pub use dag::{PhaseEdge, TaskGraph};
pub use plan::{Conflict, Phase, PlanTree};
pub use task::{ExecutionResult, TaskId, TaskNode, TaskState, WorkerKind};
