//! Result aggregation and post-run verification.
//!
//! Once the root tree terminates, the aggregator assembles the final
//! execution report: the run log, a post-hoc conflict scan over the
//! tree, and the outcome of the configured verification command.

use crate::core::plan::{Conflict, PlanTree};
use crate::core::task::ExecutionResult;
use crate::error::Result;
use crate::orchestration::scheduler::{TreeOutcome, TreeState};
use crate::{plog, plog_warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of the post-run verification command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum VerificationStatus {
    /// The verification command exited 0.
    Passed,
    /// The verification command exited nonzero.
    Failed { exit_code: Option<i32> },
    /// No verification was run (tree failed, disabled, or no command
    /// configured).
    Skipped { reason: String },
}

impl VerificationStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, VerificationStatus::Passed)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Passed => write!(f, "passed"),
            VerificationStatus::Failed {
                exit_code: Some(code),
            } => write!(f, "failed (exit code {})", code),
            VerificationStatus::Failed { exit_code: None } => {
                write!(f, "failed (terminated by signal)")
            }
            VerificationStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// The final record of one root tree run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Name of the root plan.
    pub plan: String,
    /// Terminal state of the root tree.
    pub state: TreeState,
    /// One record per task across the whole tree.
    pub results: Vec<ExecutionResult>,
    /// Same-phase claim overlaps found after the run. Advisory: by
    /// this point any overlap has already happened.
    pub conflicts: Vec<Conflict>,
    /// Post-run verification outcome.
    pub verification: VerificationStatus,
}

impl ExecutionReport {
    /// Whether the run as a whole succeeded: tree completed and
    /// verification did not fail.
    pub fn is_success(&self) -> bool {
        self.state == TreeState::Completed
            && !matches!(self.verification, VerificationStatus::Failed { .. })
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results.len() - self.succeeded_count() - self.failed_count()
    }
}

/// Assembles execution reports after the scheduler finishes.
pub struct Aggregator {
    verify_command: Option<String>,
}

impl Aggregator {
    /// Create an aggregator with an optional verification command
    /// (e.g. `cargo test` or `npm test`), run once per root tree.
    pub fn new(verify_command: Option<String>) -> Self {
        Self { verify_command }
    }

    /// Aggregator that never verifies, for `--no-verify` and dry runs.
    pub fn without_verification() -> Self {
        Self {
            verify_command: None,
        }
    }

    /// Build the final report for a finished root tree.
    ///
    /// Verification runs only when the tree completed; a halted tree
    /// is already failed and is never verified. Verification runs
    /// once, whatever its outcome.
    pub async fn aggregate(&self, tree: &PlanTree, outcome: TreeOutcome) -> Result<ExecutionReport> {
        let conflicts = tree.scan_conflicts();
        if !conflicts.is_empty() {
            for conflict in &conflicts {
                plog_warn!("post-run conflict: {}", conflict);
            }
        }

        let verification = if outcome.state != TreeState::Completed {
            VerificationStatus::Skipped {
                reason: "tree did not complete".to_string(),
            }
        } else {
            self.verify().await
        };

        let report = ExecutionReport {
            run_id: Uuid::new_v4(),
            plan: tree.name.clone(),
            state: outcome.state,
            results: outcome.results,
            conflicts,
            verification,
        };
        plog!(
            "run {}: {} succeeded, {} failed, {} skipped, verification {}",
            report.run_id,
            report.succeeded_count(),
            report.failed_count(),
            report.skipped_count(),
            report.verification
        );
        Ok(report)
    }

    async fn verify(&self) -> VerificationStatus {
        let command = match &self.verify_command {
            Some(cmd) if !cmd.trim().is_empty() => cmd.clone(),
            _ => {
                return VerificationStatus::Skipped {
                    reason: "no verification command configured".to_string(),
                }
            }
        };

        let mut parts = command.split_whitespace();
        let binary = match parts.next() {
            Some(b) => b,
            None => {
                return VerificationStatus::Skipped {
                    reason: "no verification command configured".to_string(),
                }
            }
        };

        plog!("running verification: {}", command);
        match tokio::process::Command::new(binary)
            .args(parts)
            .status()
            .await
        {
            Ok(status) if status.success() => VerificationStatus::Passed,
            Ok(status) => VerificationStatus::Failed {
                exit_code: status.code(),
            },
            Err(e) => {
                plog_warn!("verification command failed to start: {}", e);
                VerificationStatus::Failed { exit_code: None }
            }
        }
    }
}
