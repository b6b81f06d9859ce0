//! Plan tree data model.
//!
//! A plan tree is the immutable output of the parser: an ordered
//! sequence of phases plus nested sub-trees for recursive tasks. All
//! tasks in one phase are mutually independent and eligible to run
//! concurrently; a phase cannot begin until every lower-indexed phase
//! in the same tree has fully drained.

use crate::core::task::{TaskId, TaskNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A synchronization barrier grouping concurrently-eligible tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-based index; contiguous within one tree.
    pub index: u32,
    /// Tasks eligible to run concurrently once this phase starts.
    pub tasks: Vec<TaskNode>,
}

impl Phase {
    /// Create a phase with the given index and tasks.
    pub fn new(index: u32, tasks: Vec<TaskNode>) -> Self {
        Self { index, tasks }
    }
}

/// Two tasks in the same phase claiming an overlapping file path.
///
/// One conflict is reported per overlapping task pair; `paths` carries
/// every path the pair contends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Name of the tree the conflicting phase belongs to.
    pub tree: String,
    /// Phase in which both tasks are scheduled.
    pub phase: u32,
    /// First task of the pair, in phase declaration order.
    pub first: TaskId,
    /// Second task of the pair.
    pub second: TaskId,
    /// File paths claimed by both tasks.
    pub paths: Vec<PathBuf>,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<String> = self
            .paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        write!(
            f,
            "{} phase {}: {} and {} both claim {}",
            self.tree,
            self.phase,
            self.first,
            self.second,
            paths.join(", ")
        )
    }
}

/// The full dependency-ordered structure of phases plus nested sub-trees.
///
/// Constructed once by the parser and never mutated afterwards. Nesting
/// depth is bounded at parse time (root = 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTree {
    /// Human-readable plan name.
    pub name: String,
    /// Phases in execution order.
    pub phases: Vec<Phase>,
    /// Sub-trees keyed by the id of the recursive task that owns them.
    pub subplans: BTreeMap<TaskId, PlanTree>,
    /// Nesting depth of this tree (root = 0).
    pub depth: u8,
}

impl PlanTree {
    /// Create a tree with no sub-plans at the given depth.
    pub fn new(name: &str, phases: Vec<Phase>, depth: u8) -> Self {
        Self {
            name: name.to_string(),
            phases,
            subplans: BTreeMap::new(),
            depth,
        }
    }

    /// Number of phases in this tree (excluding sub-trees).
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Number of tasks in this tree (excluding sub-trees).
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }

    /// Number of tasks including every nested sub-tree.
    pub fn total_task_count(&self) -> usize {
        self.task_count()
            + self
                .subplans
                .values()
                .map(|t| t.total_task_count())
                .sum::<usize>()
    }

    /// All tasks of this tree in phase order (excluding sub-trees).
    pub fn all_tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.phases.iter().flat_map(|p| p.tasks.iter())
    }

    /// Look up a task in this tree by id (excluding sub-trees).
    pub fn get_task(&self, id: &TaskId) -> Option<&TaskNode> {
        self.all_tasks().find(|t| &t.id == id)
    }

    /// The sub-tree owned by a recursive task, if any.
    pub fn subplan(&self, id: &TaskId) -> Option<&PlanTree> {
        self.subplans.get(id)
    }

    /// Greatest nesting depth reachable from this tree.
    pub fn max_depth(&self) -> u8 {
        self.subplans
            .values()
            .map(|t| t.max_depth())
            .max()
            .unwrap_or(self.depth)
    }

    /// The file claims a task contributes to its phase.
    ///
    /// For a recursive task this is the union of its own claims and
    /// every claim in its sub-tree, since the whole sub-tree executes
    /// within the parent task's phase.
    pub fn effective_claims(&self, task: &TaskNode) -> BTreeSet<PathBuf> {
        let mut claims: BTreeSet<PathBuf> = task.files.iter().cloned().collect();
        if task.is_recursive() {
            if let Some(sub) = self.subplan(&task.id) {
                sub.collect_claims(&mut claims);
            }
        }
        claims
    }

    fn collect_claims(&self, out: &mut BTreeSet<PathBuf>) {
        for task in self.all_tasks() {
            out.extend(task.files.iter().cloned());
            if task.is_recursive() {
                if let Some(sub) = self.subplan(&task.id) {
                    sub.collect_claims(out);
                }
            }
        }
    }

    /// Scan this tree and all sub-trees for same-phase file claim
    /// overlaps.
    ///
    /// Reports exactly one [`Conflict`] per overlapping task pair. The
    /// parser runs this as pre-flight validation; the aggregator runs
    /// it again post-hoc, where a hit only documents a violation that
    /// already occurred.
    pub fn scan_conflicts(&self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        self.scan_into(&mut conflicts);
        conflicts
    }

    fn scan_into(&self, out: &mut Vec<Conflict>) {
        for phase in &self.phases {
            for (i, first) in phase.tasks.iter().enumerate() {
                let first_claims = self.effective_claims(first);
                for second in &phase.tasks[i + 1..] {
                    let second_claims = self.effective_claims(second);
                    let overlap: Vec<PathBuf> = first_claims
                        .intersection(&second_claims)
                        .cloned()
                        .collect();
                    if !overlap.is_empty() {
                        out.push(Conflict {
                            tree: self.name.clone(),
                            phase: phase.index,
                            first: first.id.clone(),
                            second: second.id.clone(),
                            paths: overlap,
                        });
                    }
                }
            }
        }

        for sub in self.subplans.values() {
            sub.scan_into(out);
        }
    }
}
