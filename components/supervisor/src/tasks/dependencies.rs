//! Blocker and related-task edges.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{TaskManager, ensure_editable};
use crate::domain::{Task, TaskId, TaskStatus, TaskView};
use crate::error::{EngineError, EngineResult};
use crate::graph::{
    compute_blocks, index_by_id, referenced_by, unmet_dependencies, validate_blocked_by,
    validate_related_to,
};

/// A dependency endpoint, resolved against the current task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// Task id.
    pub id: TaskId,
    /// Title, or empty if the id no longer resolves.
    pub title: String,
    /// Status, or `None` if the id no longer resolves.
    pub status: Option<TaskStatus>,
}

/// Every dependency relation of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependencies {
    /// Subject task.
    pub task_id: TaskId,
    /// Tasks this one waits on.
    pub blocked_by: Vec<DependencyInfo>,
    /// Tasks waiting on this one.
    pub blocks: Vec<DependencyInfo>,
    /// Informational relations.
    pub related_to: Vec<DependencyInfo>,
    /// Tasks mentioning this one in their text.
    pub referenced_by: Vec<DependencyInfo>,
    /// Blockers that are not completed.
    pub unmet_blockers: Vec<TaskId>,
}

#[derive(Clone, Copy)]
enum Edge {
    Blocker,
    Related,
}

impl TaskManager {
    /// Adds `blocker` to the task's `blocked_by`. An existing edge is a no-op.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `Precondition` if the task is running
    /// - `Graph` if the blocker is unknown, the task itself, or closes a cycle
    pub async fn add_blocker(&self, id: &TaskId, blocker: &TaskId) -> EngineResult<TaskView> {
        self.edit_edge(id, blocker, Edge::Blocker, true).await
    }

    /// Removes `blocker` from the task's `blocked_by`.
    ///
    /// # Errors
    /// Returns `TaskNotFound`, `Precondition` or `Store`.
    pub async fn remove_blocker(&self, id: &TaskId, blocker: &TaskId) -> EngineResult<TaskView> {
        self.edit_edge(id, blocker, Edge::Blocker, false).await
    }

    /// Adds `related` to the task's `related_to`. The relation is one-directional.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `Precondition` if the task is running
    /// - `Graph` if the id is unknown or the task itself
    pub async fn add_related(&self, id: &TaskId, related: &TaskId) -> EngineResult<TaskView> {
        self.edit_edge(id, related, Edge::Related, true).await
    }

    /// Removes `related` from the task's `related_to`.
    ///
    /// # Errors
    /// Returns `TaskNotFound`, `Precondition` or `Store`.
    pub async fn remove_related(&self, id: &TaskId, related: &TaskId) -> EngineResult<TaskView> {
        self.edit_edge(id, related, Edge::Related, false).await
    }

    /// Resolves every relation of a task against the current task set.
    ///
    /// # Errors
    /// Returns `TaskNotFound` or `Store`.
    pub async fn get_dependencies(&self, id: &TaskId) -> EngineResult<TaskDependencies> {
        let tasks = self.store.load_all_tasks().await?;
        let by_id = index_by_id(&tasks);
        let task = by_id
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;

        let describe = |ids: &[TaskId]| -> Vec<DependencyInfo> {
            ids.iter()
                .map(|dep| {
                    let found = by_id.get(dep);
                    DependencyInfo {
                        id: dep.clone(),
                        title: found.map(|t| t.title.clone()).unwrap_or_default(),
                        status: found.map(|t| t.status),
                    }
                })
                .collect()
        };

        Ok(TaskDependencies {
            task_id: id.clone(),
            blocked_by: describe(&task.blocked_by),
            blocks: describe(&compute_blocks(id, &tasks)),
            related_to: describe(&task.related_to),
            referenced_by: describe(&referenced_by(id, &tasks)),
            unmet_blockers: unmet_dependencies(task, &by_id),
        })
    }

    #[instrument(skip(self, edge), fields(task = %id, other = %other, add))]
    async fn edit_edge(
        &self,
        id: &TaskId,
        other: &TaskId,
        edge: Edge,
        add: bool,
    ) -> EngineResult<TaskView> {
        let tasks = self.store.load_all_tasks().await?;
        let mut task: Task = tasks
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;
        ensure_editable(&task)?;

        let list = match edge {
            Edge::Blocker => &task.blocked_by,
            Edge::Related => &task.related_to,
        };
        let present = list.contains(other);
        if present == add {
            debug!("Edge already in requested state");
            return self.get_task(id).await;
        }

        let mut updated = list.clone();
        if add {
            updated.push(other.clone());
            match edge {
                Edge::Blocker => validate_blocked_by(id, &updated, &tasks)?,
                Edge::Related => validate_related_to(id, &updated, &tasks)?,
            }
        } else {
            updated.retain(|existing| existing != other);
        }
        match edge {
            Edge::Blocker => task.blocked_by = updated,
            Edge::Related => task.related_to = updated,
        }

        task.touch();
        self.store.save_task(&task).await?;
        self.publish(
            id,
            serde_json::json!({
                "edge": match edge { Edge::Blocker => "blocked_by", Edge::Related => "related_to" },
                "other": other,
                "added": add,
            }),
        );
        self.get_task(id).await
    }
}
