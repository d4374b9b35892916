//! Task operations.
//!
//! [`TaskManager`] owns every task mutation: creation and editing here,
//! dependency edges in `dependencies`, and status transitions in
//! `state_machine`.

mod dependencies;
mod state_machine;

pub use dependencies::{DependencyInfo, TaskDependencies};
pub use state_machine::{TaskOutcome, validate_status_transition};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::consistency::LinkRegistry;
use crate::domain::{
    DependencyStatus, InitiativeId, Task, TaskId, TaskStatus, TaskView, Weight,
};
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventKind, EventPublisher, emit};
use crate::gate::GateWorkflow;
use crate::graph::{
    dedupe_preserving_order, populate_task_views, validate_blocked_by, validate_related_to,
};
use crate::planner::PhasePlanner;
use crate::repository::EntityStore;

/// Arguments for [`TaskManager::create_task`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Required title.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Weight; defaults to medium.
    #[serde(default)]
    pub weight: Option<Weight>,
    /// Initial blockers.
    #[serde(default)]
    pub blocked_by: Vec<TaskId>,
    /// Initial related tasks.
    #[serde(default)]
    pub related_to: Vec<TaskId>,
    /// Initiative to link the task into.
    #[serde(default)]
    pub initiative_id: Option<InitiativeId>,
}

/// Field changes for [`TaskManager::update_task`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description; an empty string clears it.
    #[serde(default)]
    pub description: Option<String>,
    /// New weight.
    #[serde(default)]
    pub weight: Option<Weight>,
    /// Replacement blocker list, validated as a whole.
    #[serde(default)]
    pub blocked_by: Option<Vec<TaskId>>,
    /// Replacement related list.
    #[serde(default)]
    pub related_to: Option<Vec<TaskId>>,
}

/// Filter for [`TaskManager::list_tasks`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Only tasks in this status.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Only tasks linked to this initiative.
    #[serde(default)]
    pub initiative_id: Option<InitiativeId>,
    /// Only tasks with this derived readiness.
    #[serde(default)]
    pub dependency_status: Option<DependencyStatus>,
}

impl TaskFilter {
    fn matches(&self, view: &TaskView) -> bool {
        self.status.is_none_or(|s| view.task.status == s)
            && self
                .initiative_id
                .as_ref()
                .is_none_or(|id| view.task.initiative_id.as_ref() == Some(id))
            && self
                .dependency_status
                .is_none_or(|d| view.dependency_status == d)
    }
}

/// Task creation, editing, dependency management and lifecycle transitions.
#[derive(Clone)]
pub struct TaskManager {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    planner: Arc<dyn PhasePlanner>,
    registry: LinkRegistry,
    gates: GateWorkflow,
}

impl TaskManager {
    /// Creates a task manager with injected collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        publisher: Arc<dyn EventPublisher>,
        planner: Arc<dyn PhasePlanner>,
        registry: LinkRegistry,
        gates: GateWorkflow,
    ) -> Self {
        Self {
            store,
            publisher,
            planner,
            registry,
            gates,
        }
    }

    /// Creates a task in the `Created` state, optionally linked to an initiative.
    ///
    /// # Errors
    /// - `Validation` if the title is blank
    /// - `Graph` if a blocker or related id is unknown
    /// - `InitiativeNotFound` if the initiative does not exist
    /// - `Store` if persistence fails
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_task(&self, request: NewTask) -> EngineResult<TaskView> {
        let tasks = self.store.load_all_tasks().await?;
        let id = self.store.next_task_id().await?;
        let mut task = Task::new(id.clone(), request.title)?;
        task.description = request.description.filter(|d| !d.is_empty());
        task.weight = request.weight.unwrap_or_default();
        task.blocked_by = dedupe_preserving_order(&request.blocked_by);
        task.related_to = dedupe_preserving_order(&request.related_to);
        validate_blocked_by(&id, &task.blocked_by, &tasks)?;
        validate_related_to(&id, &task.related_to, &tasks)?;

        if let Some(initiative_id) = &request.initiative_id {
            if self.store.load_initiative(initiative_id).await?.is_none() {
                return Err(EngineError::InitiativeNotFound(initiative_id.clone()));
            }
        }

        self.store.save_task(&task).await?;
        if let Some(initiative_id) = &request.initiative_id {
            self.registry
                .link(initiative_id, std::slice::from_ref(&id))
                .await?;
        }

        info!(task = %id, "Task created");
        self.publish(&id, serde_json::json!({ "created": true }));
        self.get_task(&id).await
    }

    /// Returns one task with its computed fields.
    ///
    /// # Errors
    /// Returns `TaskNotFound` or `Store`.
    pub async fn get_task(&self, id: &TaskId) -> EngineResult<TaskView> {
        let tasks = self.store.load_all_tasks().await?;
        populate_task_views(tasks)
            .into_iter()
            .find(|view| &view.task.id == id)
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))
    }

    /// Lists tasks with computed fields, ordered by id.
    ///
    /// # Errors
    /// Returns `Store` if the scan fails.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> EngineResult<Vec<TaskView>> {
        let tasks = self.store.load_all_tasks().await?;
        Ok(populate_task_views(tasks)
            .into_iter()
            .filter(|view| filter.matches(view))
            .collect())
    }

    /// Applies field changes to a task that is not running.
    ///
    /// A new blocker list is checked as a whole, so edges that only form a
    /// cycle together are rejected. Changing the weight of a planned,
    /// non-terminal task regenerates its phase plan.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `Precondition` if the task is running
    /// - `Validation` / `Graph` for invalid fields
    /// - `Planning` / `Store` for collaborator failures
    #[instrument(skip(self, update), fields(task = %id))]
    pub async fn update_task(&self, id: &TaskId, update: TaskUpdate) -> EngineResult<TaskView> {
        let tasks = self.store.load_all_tasks().await?;
        let mut task = tasks
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;
        ensure_editable(&task)?;

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(crate::domain::ValidationError::EmptyTitle.into());
            }
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(blocked_by) = update.blocked_by {
            let blocked_by = dedupe_preserving_order(&blocked_by);
            validate_blocked_by(id, &blocked_by, &tasks)?;
            task.blocked_by = blocked_by;
        }
        if let Some(related_to) = update.related_to {
            let related_to = dedupe_preserving_order(&related_to);
            validate_related_to(id, &related_to, &tasks)?;
            task.related_to = related_to;
        }
        if let Some(weight) = update.weight.filter(|w| *w != task.weight) {
            task.weight = weight;
            if !task.status.is_terminal() && !task.phases.is_empty() {
                self.replan(&mut task)?;
            }
        }

        task.touch();
        self.store.save_task(&task).await?;
        self.publish(id, serde_json::json!({ "updated": true }));
        self.get_task(id).await
    }

    /// Deletes a task that is not running, detaching it from its initiative
    /// and from every other task's blocker and related lists.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `Precondition` if the task is running
    /// - `Store` if persistence fails
    #[instrument(skip(self), fields(task = %id))]
    pub async fn delete_task(&self, id: &TaskId) -> EngineResult<()> {
        let task = self
            .store
            .load_task(id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;
        if task.status == TaskStatus::Running {
            return Err(EngineError::Precondition(format!(
                "task {id} is running and cannot be deleted"
            )));
        }

        if let Some(initiative_id) = &task.initiative_id {
            self.registry.unlink(initiative_id, id).await?;
        }
        for mut other in self.store.load_all_tasks().await? {
            if other.blocked_by.contains(id) || other.related_to.contains(id) {
                other.blocked_by.retain(|b| b != id);
                other.related_to.retain(|r| r != id);
                other.touch();
                self.store.save_task(&other).await?;
                debug!(task = %other.id, "Removed references to deleted task");
            }
        }
        self.gates.discard_for_task(id);
        self.store.delete_task(id).await?;

        info!("Task deleted");
        self.publish(id, serde_json::json!({ "deleted": true }));
        Ok(())
    }

    fn replan(&self, task: &mut Task) -> EngineResult<()> {
        let phases = self.planner.plan(task)?;
        let keeps_phase = task
            .current_phase
            .as_ref()
            .is_some_and(|current| phases.contains(current));
        if !keeps_phase {
            task.current_phase = phases.first().cloned();
        }
        debug!(task = %task.id, phases = phases.len(), "Regenerated phase plan");
        task.phases = phases;
        Ok(())
    }

    fn publish(&self, id: &TaskId, payload: serde_json::Value) {
        emit(
            self.publisher.as_ref(),
            Event::new(EventKind::TaskUpdated, id.as_str(), payload),
        );
    }
}

fn ensure_editable(task: &Task) -> EngineResult<()> {
    if task.status == TaskStatus::Running {
        return Err(EngineError::Precondition(format!(
            "task {} is running and cannot be modified",
            task.id
        )));
    }
    Ok(())
}
