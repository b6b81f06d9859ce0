//! Plan document parser and validator.
//!
//! Plan documents are TOML: a `name`, `[[phase]]` tables carrying
//! `[[phase.task]]` entries, and `[subplan.<task-id>]` tables holding
//! nested documents of the same shape. The parser produces a validated,
//! immutable [`PlanTree`] or rejects the document with a [`ParseError`]
//! naming the offending node. Nothing is ever dispatched from an
//! invalid document.

use crate::config::DEFAULT_MAX_DEPTH;
use crate::core::dag::TaskGraph;
use crate::core::plan::{Conflict, Phase, PlanTree};
use crate::core::task::{TaskId, TaskNode, WorkerKind};
use crate::error::{Error, ParseError, Result};
use crate::plog_debug;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[a-z0-9][a-z0-9_-]*$").expect("id pattern is valid"))
}

/// Raw plan document shape, before validation.
#[derive(Debug, Deserialize)]
struct PlanDoc {
    name: Option<String>,
    #[serde(default, rename = "phase")]
    phases: Vec<PhaseDoc>,
    #[serde(default, rename = "subplan")]
    subplans: BTreeMap<String, PlanDoc>,
}

#[derive(Debug, Deserialize)]
struct PhaseDoc {
    index: u32,
    #[serde(default, rename = "task")]
    tasks: Vec<TaskDoc>,
}

#[derive(Debug, Deserialize)]
struct TaskDoc {
    id: String,
    worker: Option<String>,
    scope: Option<String>,
    #[serde(default)]
    files: Vec<PathBuf>,
    blocking: Option<bool>,
}

/// Parser for phased plan documents.
pub struct PlanParser {
    max_depth: u8,
}

impl Default for PlanParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl PlanParser {
    /// Create a parser with an explicit nesting depth limit (root = 0).
    pub fn new(max_depth: u8) -> Self {
        Self { max_depth }
    }

    /// The configured nesting depth limit.
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Parse and fully validate a plan document.
    ///
    /// Same-phase file claim overlaps are treated as blocking: the
    /// first conflict found is returned as `Error::Conflict` and the
    /// tree is rejected before anything could be dispatched.
    pub fn parse_str(&self, input: &str) -> Result<PlanTree> {
        let (tree, mut conflicts) = self.check_str(input)?;
        if !conflicts.is_empty() {
            return Err(Error::Conflict(conflicts.remove(0)));
        }
        Ok(tree)
    }

    /// Parse and structurally validate a plan document, returning the
    /// tree alongside every pre-flight conflict instead of failing on
    /// the first one. Used by `parallx check` to report all findings.
    pub fn check_str(&self, input: &str) -> Result<(PlanTree, Vec<Conflict>)> {
        let doc: PlanDoc = toml::from_str(input)?;
        let name = doc.name.clone().unwrap_or_else(|| "plan".to_string());
        let mut seen = HashSet::new();
        let tree = self.build_tree(&doc, name, 0, &mut seen)?;
        let conflicts = tree.scan_conflicts();
        plog_debug!(
            "parsed plan '{}': {} phases, {} tasks, {} conflicts",
            tree.name,
            tree.phase_count(),
            tree.total_task_count(),
            conflicts.len()
        );
        Ok((tree, conflicts))
    }

    /// Parse a plan document from a file. The file stem names the plan
    /// when the document itself does not.
    pub fn parse_file(&self, path: &Path) -> Result<PlanTree> {
        let input = std::fs::read_to_string(path)?;
        let named = self.with_file_name(&input, path)?;
        self.parse_str(&named)
    }

    /// File-based variant of [`check_str`](Self::check_str).
    pub fn check_file(&self, path: &Path) -> Result<(PlanTree, Vec<Conflict>)> {
        let input = std::fs::read_to_string(path)?;
        let named = self.with_file_name(&input, path)?;
        self.check_str(&named)
    }

    fn with_file_name(&self, input: &str, path: &Path) -> Result<String> {
        let doc: PlanDoc = toml::from_str(input)?;
        if doc.name.is_some() {
            return Ok(input.to_string());
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "plan".to_string());
        Ok(format!("name = \"{}\"\n{}", stem, input))
    }

    fn build_tree(
        &self,
        doc: &PlanDoc,
        name: String,
        depth: u8,
        seen: &mut HashSet<TaskId>,
    ) -> Result<PlanTree> {
        let mut phases = self.build_phases(doc, &name, seen)?;
        phases.sort_by_key(|p| p.index);

        let mut tree = PlanTree::new(&name, phases, depth);

        // Attach sub-trees to their recursive tasks, rejecting both
        // directions of mismatch.
        let recursive_ids: Vec<TaskId> = tree
            .all_tasks()
            .filter(|t| t.is_recursive())
            .map(|t| t.id.clone())
            .collect();

        for id in &recursive_ids {
            if depth + 1 > self.max_depth {
                return Err(ParseError::DepthExceeded {
                    task: id.clone(),
                    depth: depth + 1,
                    max: self.max_depth,
                }
                .into());
            }
            let sub_doc = doc
                .subplans
                .get(id.as_str())
                .ok_or_else(|| ParseError::MissingSubPlan { task: id.clone() })?;
            let sub_name = format!("{}/{}", name, id);
            let sub_tree = self.build_tree(sub_doc, sub_name, depth + 1, seen)?;
            tree.subplans.insert(id.clone(), sub_tree);
        }

        for key in doc.subplans.keys() {
            if !recursive_ids.iter().any(|id| id.as_str() == key) {
                return Err(ParseError::OrphanSubPlan { name: key.clone() }.into());
            }
        }

        // Guards the acyclicity invariant; contiguous phases cannot
        // express a cycle, so this should never fire on parsed input.
        TaskGraph::from_tree(&tree)?;

        Ok(tree)
    }

    fn build_phases(
        &self,
        doc: &PlanDoc,
        tree_name: &str,
        seen: &mut HashSet<TaskId>,
    ) -> Result<Vec<Phase>> {
        let mut indexes = HashSet::new();
        for phase in &doc.phases {
            if !indexes.insert(phase.index) {
                return Err(ParseError::DuplicatePhase {
                    tree: tree_name.to_string(),
                    index: phase.index,
                }
                .into());
            }
        }

        let mut sorted: Vec<u32> = indexes.into_iter().collect();
        sorted.sort_unstable();
        for (i, found) in sorted.iter().enumerate() {
            let expected = (i + 1) as u32;
            if *found != expected {
                return Err(ParseError::NonContiguousPhases {
                    tree: tree_name.to_string(),
                    expected,
                    found: *found,
                }
                .into());
            }
        }

        let mut phases = Vec::with_capacity(doc.phases.len());
        for phase_doc in &doc.phases {
            if phase_doc.tasks.is_empty() {
                return Err(ParseError::EmptyPhase {
                    tree: tree_name.to_string(),
                    index: phase_doc.index,
                }
                .into());
            }

            let mut tasks = Vec::with_capacity(phase_doc.tasks.len());
            for task_doc in &phase_doc.tasks {
                tasks.push(self.build_task(task_doc, phase_doc.index, seen)?);
            }
            phases.push(Phase::new(phase_doc.index, tasks));
        }

        Ok(phases)
    }

    fn build_task(
        &self,
        doc: &TaskDoc,
        phase: u32,
        seen: &mut HashSet<TaskId>,
    ) -> Result<TaskNode> {
        if !id_pattern().is_match(&doc.id) {
            return Err(ParseError::InvalidTaskId {
                id: doc.id.clone(),
            }
            .into());
        }

        let id = TaskId::new(doc.id.clone());
        if !seen.insert(id.clone()) {
            return Err(ParseError::DuplicateTask { id }.into());
        }

        let tag = doc
            .worker
            .as_deref()
            .ok_or_else(|| ParseError::MissingWorker { task: id.clone() })?;
        let worker = WorkerKind::from_tag(tag).ok_or_else(|| ParseError::UnknownWorker {
            task: id.clone(),
            tag: tag.to_string(),
        })?;

        let scope = doc
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::MissingScope { task: id.clone() })?;

        Ok(TaskNode {
            id,
            worker,
            scope: scope.to_string(),
            files: doc.files.clone(),
            phase,
            blocking: doc.blocking.unwrap_or(true),
        })
    }
}
