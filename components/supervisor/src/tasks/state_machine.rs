//! Task State Machine - Lifecycle transitions and phase progression.
//!
//! Every transition loads the task, checks it against
//! [`TaskStatus::can_transition_to`], applies the change and saves the task.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::TaskManager;
use crate::domain::{GateType, Task, TaskId, TaskStatus, TaskView};
use crate::error::{EngineError, EngineResult};
use crate::gate::{DecisionRequest, PendingDecision};
use crate::graph::{index_by_id, unmet_dependencies};

/// Final result reported by whoever executed a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    /// The work finished successfully.
    Completed,
    /// The work failed.
    Failed,
}

impl From<TaskOutcome> for TaskStatus {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Completed => Self::Completed,
            TaskOutcome::Failed => Self::Failed,
        }
    }
}

/// Validates a status transition for `task`.
///
/// # Errors
/// Returns `InvalidTransition` when the lifecycle forbids the move.
pub fn validate_status_transition(task: &Task, to: TaskStatus) -> EngineResult<()> {
    if task.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            id: task.id.clone(),
            from: task.status,
            to,
        })
    }
}

impl TaskManager {
    /// Generates a phase plan and moves a created task to `Planned`.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `InvalidTransition` unless the task is `Created`
    /// - `Planning` if the planner fails or returns no phases
    #[instrument(skip(self), fields(task = %id))]
    pub async fn plan_task(&self, id: &TaskId) -> EngineResult<TaskView> {
        let mut task = self.load(id).await?;
        validate_status_transition(&task, TaskStatus::Planned)?;

        let phases = self.planner.plan(&task)?;
        if phases.is_empty() {
            return Err(crate::planner::PlannerError(format!("no phases planned for {id}")).into());
        }
        task.current_phase = phases.first().cloned();
        task.phases = phases;
        self.transition(task, TaskStatus::Planned).await
    }

    /// Starts a planned or paused task once every blocker is completed.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `InvalidTransition` unless the task is `Planned` or `Paused`
    /// - `Precondition` if blockers are still open
    #[instrument(skip(self), fields(task = %id))]
    pub async fn run_task(&self, id: &TaskId) -> EngineResult<TaskView> {
        self.start(id, false).await
    }

    /// Pauses a running task.
    ///
    /// # Errors
    /// Returns `TaskNotFound` or `InvalidTransition`.
    #[instrument(skip(self), fields(task = %id))]
    pub async fn pause_task(&self, id: &TaskId) -> EngineResult<TaskView> {
        let task = self.load(id).await?;
        validate_status_transition(&task, TaskStatus::Paused)?;
        self.transition(task, TaskStatus::Paused).await
    }

    /// Resumes a paused task, with the same blocker check as [`Self::run_task`].
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `InvalidTransition` unless the task is `Paused`
    /// - `Precondition` if blockers are still open
    #[instrument(skip(self), fields(task = %id))]
    pub async fn resume_task(&self, id: &TaskId) -> EngineResult<TaskView> {
        self.start(id, true).await
    }

    /// Moves a running task to its next phase without a gate.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `Precondition` unless the task is running and has a next phase
    #[instrument(skip(self), fields(task = %id))]
    pub async fn advance_phase(&self, id: &TaskId) -> EngineResult<TaskView> {
        let mut task = self.load(id).await?;
        if task.status != TaskStatus::Running {
            return Err(EngineError::Precondition(format!(
                "task {id} is {}, only running tasks advance phases",
                task.status
            )));
        }
        let Some(next) = task.next_phase().map(str::to_owned) else {
            return Err(EngineError::Precondition(format!(
                "task {id} is in its last phase"
            )));
        };
        debug!(phase = %next, "Advancing phase");
        task.current_phase = Some(next);
        task.touch();
        self.store.save_task(&task).await?;
        self.publish(id, serde_json::json!({ "phase": &task.current_phase }));
        self.get_task(id).await
    }

    /// Blocks a running task on a gate for its current phase and opens a
    /// pending decision.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `InvalidTransition` unless the task is `Running`
    /// - `Precondition` if the task has no current phase
    #[instrument(skip(self, question, context), fields(task = %id, gate = %gate_type))]
    pub async fn block_for_gate(
        &self,
        id: &TaskId,
        gate_type: GateType,
        question: String,
        context: String,
    ) -> EngineResult<PendingDecision> {
        let mut task = self.load(id).await?;
        validate_status_transition(&task, TaskStatus::Blocked)?;
        let Some(phase) = task.current_phase.clone() else {
            return Err(EngineError::Precondition(format!(
                "task {id} has no current phase to gate"
            )));
        };

        task.pending_gate = Some(gate_type);
        self.transition(task, TaskStatus::Blocked).await?;
        self.gates
            .request_decision(DecisionRequest {
                task_id: id.clone(),
                phase,
                gate_type,
                question,
                context,
            })
            .await
    }

    /// Records the final outcome of a running task.
    ///
    /// # Errors
    /// Returns `TaskNotFound`, or `InvalidTransition` unless the task is `Running`.
    #[instrument(skip(self), fields(task = %id))]
    pub async fn report_outcome(&self, id: &TaskId, outcome: TaskOutcome) -> EngineResult<TaskView> {
        let task = self.load(id).await?;
        let target = TaskStatus::from(outcome);
        validate_status_transition(&task, target)?;
        self.transition(task, target).await
    }

    /// Returns a failed task to `Planned`, optionally rewinding to `from_phase`.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `InvalidTransition` unless the task is `Failed`
    /// - `InvalidArgument` if `from_phase` is not in the plan
    #[instrument(skip(self), fields(task = %id))]
    pub async fn retry_task(&self, id: &TaskId, from_phase: Option<&str>) -> EngineResult<TaskView> {
        let mut task = self.load(id).await?;
        if task.status != TaskStatus::Failed {
            return Err(EngineError::InvalidTransition {
                id: id.clone(),
                from: task.status,
                to: TaskStatus::Planned,
            });
        }
        if let Some(phase) = from_phase {
            if !task.phases.iter().any(|p| p == phase) {
                return Err(EngineError::InvalidArgument(format!(
                    "phase {phase} is not part of the plan for {id}"
                )));
            }
            task.current_phase = Some(phase.to_owned());
        } else if task.current_phase.is_none() {
            task.current_phase = task.phases.first().cloned();
        }
        task.pending_gate = None;
        self.transition(task, TaskStatus::Planned).await
    }

    async fn start(&self, id: &TaskId, paused_only: bool) -> EngineResult<TaskView> {
        let tasks = self.store.load_all_tasks().await?;
        let task = tasks
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?;
        if paused_only && task.status != TaskStatus::Paused {
            return Err(EngineError::InvalidTransition {
                id: id.clone(),
                from: task.status,
                to: TaskStatus::Running,
            });
        }
        validate_status_transition(&task, TaskStatus::Running)?;

        let unmet = unmet_dependencies(&task, &index_by_id(&tasks));
        if !unmet.is_empty() {
            let unmet: Vec<&str> = unmet.iter().map(TaskId::as_str).collect();
            return Err(EngineError::Precondition(format!(
                "task {id} is blocked by: {}",
                unmet.join(", ")
            )));
        }
        self.transition(task, TaskStatus::Running).await
    }

    async fn load(&self, id: &TaskId) -> EngineResult<Task> {
        self.store
            .load_task(id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(id.clone()))
    }

    async fn transition(&self, mut task: Task, to: TaskStatus) -> EngineResult<TaskView> {
        let from = task.status;
        task.set_status(to);
        self.store.save_task(&task).await?;
        info!(task = %task.id, %from, %to, "Task status changed");
        self.publish(
            &task.id,
            serde_json::json!({ "from": from, "to": to }),
        );
        self.get_task(&task.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::EntityStore;
    use crate::tasks::tests::{manager, new_task};
    use crate::tasks::NewTask;

    #[test]
    fn validate_rejects_skipping_planning() {
        let task = Task::new(TaskId::from_sequence(1), "Raw").unwrap();
        let err = validate_status_transition(&task, TaskStatus::Running).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: TaskStatus::Created,
                to: TaskStatus::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn plan_sets_first_phase() {
        let (_, manager) = manager();
        let id = manager.create_task(new_task("Plan")).await.unwrap().task.id;
        let view = manager.plan_task(&id).await.unwrap();
        assert_eq!(view.task.status, TaskStatus::Planned);
        assert_eq!(view.task.phases, vec!["spec", "implement", "review"]);
        assert_eq!(view.task.current_phase.as_deref(), Some("spec"));
    }

    #[tokio::test]
    async fn run_requires_completed_blockers() {
        let (_, manager) = manager();
        let a = manager.create_task(new_task("A")).await.unwrap().task.id;
        let b = manager
            .create_task(NewTask {
                blocked_by: vec![a.clone()],
                ..new_task("B")
            })
            .await
            .unwrap()
            .task
            .id;
        manager.plan_task(&b).await.unwrap();
        let err = manager.run_task(&b).await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(ref msg) if msg.contains("TASK-001")));

        manager.plan_task(&a).await.unwrap();
        manager.run_task(&a).await.unwrap();
        manager.report_outcome(&a, TaskOutcome::Completed).await.unwrap();
        let view = manager.run_task(&b).await.unwrap();
        assert_eq!(view.task.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn advance_walks_phases_until_last() {
        let (_, manager) = manager();
        let id = manager.create_task(new_task("Walk")).await.unwrap().task.id;
        manager.plan_task(&id).await.unwrap();
        manager.run_task(&id).await.unwrap();
        manager.advance_phase(&id).await.unwrap();
        let view = manager.advance_phase(&id).await.unwrap();
        assert_eq!(view.task.current_phase.as_deref(), Some("review"));
        let err = manager.advance_phase(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let (_, manager) = manager();
        let id = manager.create_task(new_task("Pause")).await.unwrap().task.id;
        manager.plan_task(&id).await.unwrap();
        assert!(manager.resume_task(&id).await.is_err());
        manager.run_task(&id).await.unwrap();
        assert_eq!(
            manager.pause_task(&id).await.unwrap().task.status,
            TaskStatus::Paused
        );
        assert_eq!(
            manager.resume_task(&id).await.unwrap().task.status,
            TaskStatus::Running
        );
    }

    #[tokio::test]
    async fn block_for_gate_opens_pending_decision() {
        let (store, manager) = manager();
        let id = manager.create_task(new_task("Gate")).await.unwrap().task.id;
        manager.plan_task(&id).await.unwrap();
        manager.run_task(&id).await.unwrap();
        let pending = manager
            .block_for_gate(&id, GateType::Human, "Ship it?".into(), String::new())
            .await
            .unwrap();
        assert_eq!(pending.phase, "spec");
        let task = store.load_task(&id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Blocked);
        assert_eq!(task.pending_gate, Some(GateType::Human));
    }

    #[tokio::test]
    async fn retry_rewinds_to_requested_phase() {
        let (_, manager) = manager();
        let id = manager.create_task(new_task("Retry")).await.unwrap().task.id;
        manager.plan_task(&id).await.unwrap();
        manager.run_task(&id).await.unwrap();
        manager.advance_phase(&id).await.unwrap();
        manager.report_outcome(&id, TaskOutcome::Failed).await.unwrap();

        let err = manager.retry_task(&id, Some("deploy")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        let view = manager.retry_task(&id, Some("spec")).await.unwrap();
        assert_eq!(view.task.status, TaskStatus::Planned);
        assert_eq!(view.task.current_phase.as_deref(), Some("spec"));
    }

    #[tokio::test]
    async fn completed_tasks_are_terminal() {
        let (_, manager) = manager();
        let id = manager.create_task(new_task("Done")).await.unwrap().task.id;
        manager.plan_task(&id).await.unwrap();
        manager.run_task(&id).await.unwrap();
        manager.report_outcome(&id, TaskOutcome::Completed).await.unwrap();
        assert!(manager.retry_task(&id, None).await.is_err());
        assert!(manager.run_task(&id).await.is_err());
    }
}
