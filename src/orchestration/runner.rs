//! Task execution seam.
//!
//! The scheduler dispatches leaf tasks through the [`TaskRunner`]
//! trait. The production implementation spawns the configured worker
//! command per task; tests substitute a stub that records the dispatch
//! order instead of running anything.

use crate::config::Config;
use crate::core::task::{TaskNode, WorkerKind};
use crate::plog_debug;
use crate::worker::Worker;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::path::PathBuf;

/// What a worker reports back when its task finishes successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskReport {
    /// File paths the worker touched.
    pub files_touched: Vec<PathBuf>,
}

impl TaskReport {
    pub fn with_files(files_touched: Vec<PathBuf>) -> Self {
        Self { files_touched }
    }
}

/// Executes a single leaf task to completion.
///
/// Implementations must be cheap to share; the scheduler holds one
/// runner behind an `Arc` and calls it concurrently for every task of
/// the active phase. The error string becomes the task's failure
/// detail verbatim.
pub trait TaskRunner: Send + Sync {
    fn run(&self, node: &TaskNode) -> BoxFuture<'static, std::result::Result<TaskReport, String>>;
}

/// Runs tasks by spawning the worker command configured for the task's
/// worker tag, with the scope passed as the final argument.
pub struct CommandRunner {
    workers: HashMap<WorkerKind, Worker>,
}

impl CommandRunner {
    pub fn new(config: &Config) -> Self {
        let workers = WorkerKind::ALL
            .iter()
            .filter(|k| !k.is_recursive())
            .map(|&k| (k, Worker::from_config(config, k)))
            .collect();
        Self { workers }
    }

    /// Check that every worker command resolvable from the config is
    /// actually on PATH. Returns the missing binaries.
    pub fn missing_binaries(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .workers
            .values()
            .filter(|w| !w.is_available())
            .map(|w| w.binary().to_string())
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

impl TaskRunner for CommandRunner {
    fn run(&self, node: &TaskNode) -> BoxFuture<'static, std::result::Result<TaskReport, String>> {
        let worker = match self.workers.get(&node.worker) {
            Some(w) => w,
            // Recursive tasks are expanded by the scheduler, never
            // dispatched here.
            None => {
                let worker = node.worker;
                return async move {
                    Err(format!("no runnable worker for tag '{}'", worker))
                }
                .boxed();
            }
        };

        let argv = worker.command(Some(&node.scope));
        let declared_files = node.files.clone();
        let task_id = node.id.clone();

        async move {
            let (binary, args) = argv
                .split_first()
                .ok_or_else(|| "empty worker command".to_string())?;

            plog_debug!("spawning worker for {}: {:?}", task_id, argv);

            let status = tokio::process::Command::new(binary)
                .args(args)
                .status()
                .await
                .map_err(|e| format!("failed to spawn '{}': {}", binary, e))?;

            if status.success() {
                // Workers do not report their writes; the declared
                // claims stand in for files touched.
                Ok(TaskReport::with_files(declared_files))
            } else {
                match status.code() {
                    Some(code) => Err(format!("worker exited with code {}", code)),
                    None => Err("worker terminated by signal".to_string()),
                }
            }
        }
        .boxed()
    }
}

/// Runner for `--dry-run`: every task succeeds instantly with its
/// declared file claims, nothing is spawned.
pub struct DryRunner;

impl TaskRunner for DryRunner {
    fn run(&self, node: &TaskNode) -> BoxFuture<'static, std::result::Result<TaskReport, String>> {
        let files = node.files.clone();
        async move { Ok(TaskReport::with_files(files)) }.boxed()
    }
}
