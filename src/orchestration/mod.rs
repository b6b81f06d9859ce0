//! Execution engine: runner seam, phase-barrier scheduler, and result
//! aggregation.

pub mod aggregator;
pub mod runner;
pub mod scheduler;

pub use aggregator::{Aggregator, ExecutionReport, VerificationStatus};
pub use runner::{CommandRunner, DryRunner, TaskReport, TaskRunner};
pub use scheduler::{Scheduler, SchedulerEvent, TreeOutcome, TreeState};
