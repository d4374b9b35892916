//! Gate request and resolution.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::pending::{PendingDecision, PendingDecisionStore};
use crate::domain::{
    DecisionId, GateDecision, GateType, InitiativeId, Task, TaskId, TaskStatus,
};
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventKind, EventPublisher, emit};
use crate::repository::EntityStore;

/// Arguments for [`GateWorkflow::request_decision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Task waiting on the gate.
    pub task_id: TaskId,
    /// Phase the gate guards.
    pub phase: String,
    /// Kind of gate.
    pub gate_type: GateType,
    /// Question put to the approver.
    pub question: String,
    /// Supporting context.
    pub context: String,
}

/// A gate decision from a task's execution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDecision {
    /// Task the decision was recorded on.
    pub task_id: TaskId,
    /// The recorded decision.
    #[serde(flatten)]
    pub gate: GateDecision,
}

/// Coordinates pending decisions with task state.
#[derive(Clone)]
pub struct GateWorkflow {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    pending: Arc<PendingDecisionStore>,
}

impl GateWorkflow {
    /// Creates a workflow over an injected pending-decision store.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        publisher: Arc<dyn EventPublisher>,
        pending: Arc<PendingDecisionStore>,
    ) -> Self {
        Self {
            store,
            publisher,
            pending,
        }
    }

    /// Returns the shared pending-decision store.
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingDecisionStore> {
        &self.pending
    }

    /// Records an approval request for a blocked task.
    ///
    /// Repeating a request for the same task, phase and gate type returns the
    /// existing pending decision.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `Precondition` if the task is not blocked or `phase` is not its current phase
    /// - `Store` if the read fails
    #[instrument(skip(self, request), fields(task = %request.task_id, phase = %request.phase))]
    pub async fn request_decision(&self, request: DecisionRequest) -> EngineResult<PendingDecision> {
        let task = self
            .store
            .load_task(&request.task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(request.task_id.clone()))?;
        if task.status != TaskStatus::Blocked {
            return Err(EngineError::Precondition(format!(
                "task {} is {}, decisions can only be requested for blocked tasks",
                task.id, task.status
            )));
        }
        if task.current_phase.as_deref() != Some(request.phase.as_str()) {
            return Err(EngineError::Precondition(format!(
                "task {} is in phase {}, not {}",
                task.id,
                task.current_phase.as_deref().unwrap_or("<none>"),
                request.phase
            )));
        }

        let candidate = PendingDecision {
            decision_id: DecisionId::generate(),
            task_id: request.task_id,
            initiative_id: task.initiative_id,
            phase: request.phase,
            gate_type: request.gate_type,
            question: request.question,
            context: request.context,
            requested_at: Utc::now(),
        };
        let (decision, inserted) = self.pending.insert_or_get(candidate);
        if inserted {
            info!(decision = %decision.decision_id, "Gate decision requested");
            emit(
                self.publisher.as_ref(),
                Event::new(
                    EventKind::DecisionRequested,
                    decision.decision_id.as_str(),
                    serde_json::json!({
                        "task_id": &decision.task_id,
                        "phase": &decision.phase,
                        "gate_type": decision.gate_type,
                        "question": &decision.question,
                    }),
                ),
            );
        } else {
            debug!(decision = %decision.decision_id, "Gate decision already pending");
        }
        Ok(decision)
    }

    /// Resolves a pending decision, appending a [`GateDecision`] to the task
    /// and moving it to `Planned` (approved) or `Failed` (rejected).
    ///
    /// The decision is claimed before any check, so a concurrent resolution
    /// of the same id observes `DecisionNotFound`. It is put back only when
    /// persistence fails.
    ///
    /// # Errors
    /// - `DecisionNotFound` if the id is unknown or already resolved
    /// - `TaskNotFound` if the task was deleted
    /// - `Precondition` if the task is no longer blocked
    /// - `StaleDecision` if the task has moved to another phase
    /// - `Store` if the task write fails
    #[instrument(skip(self, reason), fields(decision = %decision_id))]
    pub async fn resolve_decision(
        &self,
        decision_id: &DecisionId,
        approved: bool,
        reason: Option<String>,
    ) -> EngineResult<Task> {
        let claimed = self
            .pending
            .claim(decision_id)
            .ok_or_else(|| EngineError::DecisionNotFound(decision_id.clone()))?;

        let task = match self.apply(&claimed, approved, reason.clone()).await {
            Ok(task) => task,
            Err(e) => {
                if matches!(e, EngineError::Store(_)) {
                    self.pending.restore(claimed);
                } else {
                    warn!(error = %e, "Dropping unresolvable pending decision");
                }
                return Err(e);
            }
        };

        metrics::counter!("keel_decisions_resolved_total", "approved" => approved.to_string())
            .increment(1);
        info!(task = %task.id, status = %task.status, "Gate decision resolved");
        emit(
            self.publisher.as_ref(),
            Event::new(
                EventKind::DecisionResolved,
                decision_id.as_str(),
                serde_json::json!({
                    "task_id": &task.id,
                    "phase": &claimed.phase,
                    "gate_type": claimed.gate_type,
                    "approved": approved,
                    "reason": reason,
                    "new_status": task.status,
                }),
            ),
        );
        Ok(task)
    }

    async fn apply(
        &self,
        decision: &PendingDecision,
        approved: bool,
        reason: Option<String>,
    ) -> EngineResult<Task> {
        let mut task = self
            .store
            .load_task(&decision.task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(decision.task_id.clone()))?;

        if task.status != TaskStatus::Blocked {
            return Err(EngineError::Precondition(format!(
                "task {} is {}, not blocked",
                task.id, task.status
            )));
        }
        let current = task.current_phase.clone().unwrap_or_default();
        if current != decision.phase {
            return Err(EngineError::StaleDecision {
                decision: decision.decision_id.clone(),
                task: task.id.clone(),
                recorded: decision.phase.clone(),
                current,
            });
        }

        task.gates.push(GateDecision {
            phase: decision.phase.clone(),
            gate_type: decision.gate_type,
            approved,
            reason: reason.filter(|r| !r.is_empty()),
            timestamp: Utc::now(),
        });
        task.pending_gate = None;
        if approved {
            if let Some(next) = task.next_phase().map(str::to_string) {
                task.current_phase = Some(next);
            }
            task.set_status(TaskStatus::Planned);
        } else {
            task.set_status(TaskStatus::Failed);
        }
        self.store.save_task(&task).await?;
        Ok(task)
    }

    /// Lists pending decisions, optionally for one initiative.
    #[must_use]
    pub fn list_pending(&self, initiative_id: Option<&InitiativeId>) -> Vec<PendingDecision> {
        self.pending
            .list()
            .into_iter()
            .filter(|p| initiative_id.is_none_or(|id| p.initiative_id.as_ref() == Some(id)))
            .collect()
    }

    /// Returns one pending decision.
    ///
    /// # Errors
    /// Returns `DecisionNotFound` if it is not pending.
    pub fn get_pending(&self, decision_id: &DecisionId) -> EngineResult<PendingDecision> {
        self.pending
            .get(decision_id)
            .ok_or_else(|| EngineError::DecisionNotFound(decision_id.clone()))
    }

    /// Lists resolved gate decisions from task execution records, newest first.
    ///
    /// # Errors
    /// Returns `TaskNotFound` for an unknown `task_id`, or `Store` if a read fails.
    pub async fn list_resolved(&self, task_id: Option<&TaskId>) -> EngineResult<Vec<ResolvedDecision>> {
        let tasks = match task_id {
            Some(id) => vec![self
                .store
                .load_task(id)
                .await?
                .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?],
            None => self.store.load_all_tasks().await?,
        };
        let mut resolved: Vec<ResolvedDecision> = tasks
            .into_iter()
            .flat_map(|task| {
                let task_id = task.id;
                task.gates.into_iter().map(move |gate| ResolvedDecision {
                    task_id: task_id.clone(),
                    gate,
                })
            })
            .collect();
        resolved.sort_by(|a, b| b.gate.timestamp.cmp(&a.gate.timestamp));
        Ok(resolved)
    }

    /// Rebuilds pending decisions from tasks in the `Blocked` state and drops
    /// entries whose task is no longer blocked. Returns the number restored.
    ///
    /// # Errors
    /// Returns `Store` if the task scan fails.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> EngineResult<usize> {
        let tasks = self.store.load_all_tasks().await?;
        let blocked: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .collect();

        let pruned = self.pending.retain(|p| {
            blocked.iter().any(|t| {
                t.id == p.task_id && t.current_phase.as_deref() == Some(p.phase.as_str())
            })
        });

        let mut restored = 0;
        for task in blocked {
            let Some(phase) = task.current_phase.clone() else {
                warn!(task = %task.id, "Blocked task has no current phase; cannot restore its gate");
                continue;
            };
            let (_, inserted) = self.pending.insert_or_get(PendingDecision {
                decision_id: DecisionId::generate(),
                task_id: task.id.clone(),
                initiative_id: task.initiative_id.clone(),
                question: format!("Approve phase {phase} of {}?", task.id),
                phase,
                gate_type: task.pending_gate.unwrap_or_default(),
                context: task.title.clone(),
                requested_at: Utc::now(),
            });
            if inserted {
                restored += 1;
            }
        }
        info!(restored, pruned, "Rebuilt pending decisions");
        Ok(restored)
    }

    /// Drops pending decisions for a task leaving the `Blocked` state by
    /// another path (deletion).
    pub fn discard_for_task(&self, task_id: &TaskId) -> usize {
        self.pending.discard_for_task(task_id)
    }
}
