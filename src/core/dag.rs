//! Task graph for barrier-ordered scheduling.
//!
//! The parsed plan tree is lowered into a directed acyclic graph whose
//! edges encode the phase barrier: every task of phase i precedes every
//! task of phase i+1. Phase-barrier semantics then fall out of ordinary
//! readiness checks: a task becomes ready exactly when all of its
//! predecessors are terminal.

use crate::core::plan::PlanTree;
use crate::core::task::{TaskId, TaskNode};
use crate::error::{ParseError, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// A barrier dependency between tasks of two consecutive phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseEdge {
    /// Phase that must fully drain first.
    pub from_phase: u32,
    /// Phase that waits on the barrier.
    pub to_phase: u32,
}

/// The lowered dependency graph of one plan tree.
///
/// Sub-trees are not flattened into the graph; each tree gets its own
/// graph when its scheduler runs.
pub struct TaskGraph {
    graph: DiGraph<TaskNode, PhaseEdge>,
    index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Lower a plan tree into its barrier graph.
    ///
    /// # Errors
    /// Returns `ParseError::CyclicPhases` if the resulting graph is
    /// cyclic. Contiguous integer phases cannot express a cycle, so
    /// this guards the invariant rather than an expected input.
    pub fn from_tree(tree: &PlanTree) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut phase_nodes: Vec<(u32, Vec<NodeIndex>)> = Vec::new();

        for phase in &tree.phases {
            let mut nodes = Vec::with_capacity(phase.tasks.len());
            for task in &phase.tasks {
                let node = graph.add_node(task.clone());
                index.insert(task.id.clone(), node);
                nodes.push(node);
            }
            phase_nodes.push((phase.index, nodes));
        }

        for pair in phase_nodes.windows(2) {
            let (from_phase, ref from_nodes) = pair[0];
            let (to_phase, ref to_nodes) = pair[1];
            for &from in from_nodes {
                for &to in to_nodes {
                    graph.add_edge(
                        from,
                        to,
                        PhaseEdge {
                            from_phase,
                            to_phase,
                        },
                    );
                }
            }
        }

        if is_cyclic_directed(&graph) {
            let task = graph
                .node_weights()
                .next()
                .map(|t| t.id.clone())
                .unwrap_or_else(|| TaskId::new("unknown"));
            return Err(ParseError::CyclicPhases { task }.into());
        }

        Ok(Self { graph, index })
    }

    /// Get a task by its id.
    pub fn get_task(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index
            .get(id)
            .and_then(|&node| self.graph.node_weight(node))
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    /// Number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of barrier edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All tasks ready to dispatch given the set of terminal task ids.
    ///
    /// A task is ready when it is not itself terminal and every
    /// predecessor is. With barrier edges this returns exactly the
    /// tasks of the lowest non-drained phase, and nothing from later
    /// phases.
    pub fn ready_tasks<'a>(&'a self, terminal: &HashSet<TaskId>) -> Vec<&'a TaskNode> {
        self.graph
            .node_indices()
            .filter_map(|node| {
                let task = self.graph.node_weight(node)?;

                if terminal.contains(&task.id) {
                    return None;
                }

                let barrier_drained = self
                    .graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                    .all(|dep| {
                        self.graph
                            .node_weight(dep)
                            .map(|dep_task| terminal.contains(&dep_task.id))
                            .unwrap_or(false)
                    });

                if barrier_drained {
                    Some(task)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Check if every task in the graph is terminal.
    pub fn all_terminal(&self, terminal: &HashSet<TaskId>) -> bool {
        self.index.keys().all(|id| terminal.contains(id))
    }

    /// Number of tasks not yet terminal.
    pub fn pending_count(&self, terminal: &HashSet<TaskId>) -> usize {
        self.index
            .keys()
            .filter(|id| !terminal.contains(id))
            .count()
    }

    /// Tasks in topological (barrier-respecting) order.
    pub fn topological_order(&self) -> Result<Vec<&TaskNode>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let task = self
                .graph
                .node_weight(cycle.node_id())
                .map(|t| t.id.clone())
                .unwrap_or_else(|| TaskId::new("unknown"));
            crate::error::Error::from(ParseError::CyclicPhases { task })
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|node| self.graph.node_weight(node))
            .collect())
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("barriers", &self.dependency_count())
            .finish()
    }
}
