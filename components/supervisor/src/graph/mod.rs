//! Dependency Graph Resolver
//!
//! Pure functions over an in-memory snapshot of tasks or initiatives:
//! reverse-blocking edges, readiness, reference validation, and cycle
//! detection. Nothing here touches the store; callers load a snapshot once
//! per request and pass it in.
//!
//! The task graph and the initiative graph are kept separate. The generic
//! functions work on anything implementing [`DependencyNode`].

mod cycle;
mod references;

pub use cycle::detect_cycle_with_all;
pub use references::{detect_task_references, referenced_by};

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

use thiserror::Error;

use crate::domain::{
    DependencyStatus, Initiative, InitiativeStatus, InitiativeView, Task, TaskId, TaskStatus,
    TaskView,
};

/// A vertex in a `blocked_by` graph.
pub trait DependencyNode {
    /// Identifier type of the graph.
    type Id: Clone + Eq + Hash + Ord + Display;

    /// This node's id.
    fn node_id(&self) -> &Self::Id;

    /// Ids this node waits on.
    fn blockers(&self) -> &[Self::Id];

    /// Whether this node satisfies the nodes it blocks.
    fn is_satisfied(&self) -> bool;
}

impl DependencyNode for Task {
    type Id = TaskId;

    fn node_id(&self) -> &TaskId {
        &self.id
    }

    fn blockers(&self) -> &[TaskId] {
        &self.blocked_by
    }

    fn is_satisfied(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

impl DependencyNode for Initiative {
    type Id = crate::domain::InitiativeId;

    fn node_id(&self) -> &Self::Id {
        &self.id
    }

    fn blockers(&self) -> &[Self::Id] {
        &self.blocked_by
    }

    fn is_satisfied(&self) -> bool {
        self.status == InitiativeStatus::Completed
    }
}

/// Reference validation and cycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A node listed itself.
    #[error("{id} cannot reference itself")]
    SelfReference {
        /// Offending id.
        id: String,
    },
    /// A referenced id does not exist.
    #[error("referenced id {id} does not exist")]
    UnknownReference {
        /// Offending id.
        id: String,
    },
    /// The proposed edge set closes a cycle.
    #[error("circular dependency: {}", render_cycle(.path))]
    CircularDependency {
        /// Cycle in traversal order, starting at the node being updated.
        path: Vec<String>,
    },
}

fn render_cycle(path: &[String]) -> String {
    let mut rendered = path.join(" -> ");
    if let Some(first) = path.first() {
        rendered.push_str(" -> ");
        rendered.push_str(first);
    }
    rendered
}

/// Indexes a snapshot by id.
#[must_use]
pub fn index_by_id<N: DependencyNode>(nodes: &[N]) -> HashMap<&N::Id, &N> {
    nodes.iter().map(|n| (n.node_id(), n)).collect()
}

/// Builds the reverse adjacency map in one pass: blocker id to the ids it blocks.
///
/// Each list is sorted. Ids that block nothing are absent.
#[must_use]
pub fn reverse_index<N: DependencyNode>(nodes: &[N]) -> HashMap<N::Id, Vec<N::Id>> {
    let mut index: HashMap<N::Id, Vec<N::Id>> = HashMap::new();
    for node in nodes {
        for blocker in node.blockers() {
            index
                .entry(blocker.clone())
                .or_default()
                .push(node.node_id().clone());
        }
    }
    for blocked in index.values_mut() {
        blocked.sort();
        blocked.dedup();
    }
    index
}

/// Returns the ids whose `blocked_by` contains `id`.
#[must_use]
pub fn compute_blocks<N: DependencyNode>(id: &N::Id, nodes: &[N]) -> Vec<N::Id> {
    reverse_index(nodes).remove(id).unwrap_or_default()
}

/// Returns the blockers of `node` that are not satisfied.
///
/// An id that does not resolve in `by_id` counts as unmet.
#[must_use]
pub fn unmet_dependencies<N: DependencyNode>(node: &N, by_id: &HashMap<&N::Id, &N>) -> Vec<N::Id> {
    node.blockers()
        .iter()
        .filter(|blocker| !by_id.get(blocker).is_some_and(|b| b.is_satisfied()))
        .cloned()
        .collect()
}

/// Derives the readiness of a task from its status and unmet blockers.
#[must_use]
pub fn dependency_status(task: &Task, unmet: &[TaskId]) -> DependencyStatus {
    if !task.status.is_schedulable() {
        DependencyStatus::None
    } else if unmet.is_empty() {
        DependencyStatus::Ready
    } else {
        DependencyStatus::Blocked
    }
}

/// Returns the tasks that are neither completed nor running and whose
/// blockers are all completed.
#[must_use]
pub fn ready_tasks(tasks: &[Task]) -> Vec<&Task> {
    let by_id = index_by_id(tasks);
    tasks
        .iter()
        .filter(|t| t.status.is_schedulable() && unmet_dependencies(*t, &by_id).is_empty())
        .collect()
}

/// Checks a reference list for self-references and unknown ids.
///
/// # Errors
/// Returns the first offending reference.
pub fn validate_references<N: DependencyNode>(
    id: &N::Id,
    references: &[N::Id],
    nodes: &[N],
) -> Result<(), GraphError> {
    let known: HashSet<&N::Id> = nodes.iter().map(|n| n.node_id()).collect();
    for reference in references {
        if reference == id {
            return Err(GraphError::SelfReference { id: id.to_string() });
        }
        if !known.contains(reference) {
            return Err(GraphError::UnknownReference {
                id: reference.to_string(),
            });
        }
    }
    Ok(())
}

/// Validates a node's proposed blockers: known ids, no self-reference, no cycle
/// once the whole set is applied. Works for tasks and initiatives alike.
///
/// # Errors
/// Returns `GraphError` describing the first violation.
pub fn validate_blocked_by<N: DependencyNode>(
    id: &N::Id,
    blockers: &[N::Id],
    nodes: &[N],
) -> Result<(), GraphError> {
    validate_references(id, blockers, nodes)?;
    match detect_cycle_with_all(id, blockers, nodes) {
        Some(path) => Err(GraphError::CircularDependency {
            path: path.iter().map(ToString::to_string).collect(),
        }),
        None => Ok(()),
    }
}

/// Validates a task's related ids: known ids and no self-reference.
///
/// # Errors
/// Returns `GraphError` describing the first violation.
pub fn validate_related_to(
    id: &TaskId,
    related: &[TaskId],
    tasks: &[Task],
) -> Result<(), GraphError> {
    validate_references(id, related, tasks)
}

/// Removes repeated ids, keeping the first occurrence.
#[must_use]
pub fn dedupe_preserving_order<T: Clone + Eq + Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
}

/// Computes every derived task field over one snapshot.
///
/// The reverse index, id map and mention index are each built once.
#[must_use]
pub fn populate_task_views(tasks: Vec<Task>) -> Vec<TaskView> {
    let (blocks, unmet, referenced) = {
        let by_id = index_by_id(&tasks);
        let blocks = reverse_index(&tasks);
        let unmet: Vec<Vec<TaskId>> = tasks
            .iter()
            .map(|t| unmet_dependencies(t, &by_id))
            .collect();
        let referenced = references::referenced_by_index(&tasks);
        (blocks, unmet, referenced)
    };

    tasks
        .into_iter()
        .zip(unmet)
        .map(|(task, unmet_blockers)| {
            let dependency_status = dependency_status(&task, &unmet_blockers);
            TaskView {
                blocks: blocks.get(&task.id).cloned().unwrap_or_default(),
                referenced_by: referenced.get(&task.id).cloned().unwrap_or_default(),
                unmet_blockers,
                dependency_status,
                task,
            }
        })
        .collect()
}

/// Computes the derived initiative fields over one snapshot.
#[must_use]
pub fn populate_initiative_views(initiatives: Vec<Initiative>) -> Vec<InitiativeView> {
    let (blocks, met) = {
        let by_id = index_by_id(&initiatives);
        let blocks = reverse_index(&initiatives);
        let met: Vec<bool> = initiatives
            .iter()
            .map(|i| unmet_dependencies(i, &by_id).is_empty())
            .collect();
        (blocks, met)
    };

    initiatives
        .into_iter()
        .zip(met)
        .map(|(initiative, blocked_by_met)| InitiativeView {
            blocks: blocks.get(&initiative.id).cloned().unwrap_or_default(),
            blocked_by_met,
            initiative,
        })
        .collect()
}
