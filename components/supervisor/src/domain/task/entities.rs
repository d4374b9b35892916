//! Task domain - Task entity and its computed view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::gate::{GateDecision, GateType};
use super::status::{DependencyStatus, TaskStatus, Weight};
use crate::domain::ids::{InitiativeId, TaskId};
use crate::domain::ValidationError;

/// Persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier.
    pub id: TaskId,
    /// Short human-readable title.
    pub title: String,
    /// Optional long-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Size of the work; drives the phase plan.
    #[serde(default)]
    pub weight: Weight,
    /// Tasks that must complete before this one may start. Ordered, no duplicates.
    #[serde(default)]
    pub blocked_by: Vec<TaskId>,
    /// Informational, non-blocking relations.
    #[serde(default)]
    pub related_to: Vec<TaskId>,
    /// Back-reference to the owning initiative.
    #[serde(default)]
    pub initiative_id: Option<InitiativeId>,
    /// Phase plan, in execution order.
    #[serde(default)]
    pub phases: Vec<String>,
    /// Phase currently executing or awaiting a gate.
    #[serde(default)]
    pub current_phase: Option<String>,
    /// Gate the current phase is waiting on, while `Blocked`.
    #[serde(default)]
    pub pending_gate: Option<GateType>,
    /// Append-only log of resolved gates.
    #[serde(default)]
    pub gates: Vec<GateDecision>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Constructs a new task in the `Created` state.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyTitle` if the title is blank.
    pub fn new(id: TaskId, title: impl Into<String>) -> Result<Self, ValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let now = Utc::now();
        Ok(Self {
            id,
            title,
            description: None,
            status: TaskStatus::Created,
            weight: Weight::default(),
            blocked_by: Vec::new(),
            related_to: Vec::new(),
            initiative_id: None,
            phases: Vec::new(),
            current_phase: None,
            pending_gate: None,
            gates: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets the status and bumps `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Text scanned for `TASK-NNN` mentions.
    #[must_use]
    pub fn searchable_text(&self) -> String {
        match &self.description {
            Some(description) => format!("{} {description}", self.title),
            None => self.title.clone(),
        }
    }

    /// Returns the phase after the current one, if any.
    #[must_use]
    pub fn next_phase(&self) -> Option<&str> {
        let current = self.current_phase.as_deref()?;
        let position = self.phases.iter().position(|p| p == current)?;
        self.phases.get(position + 1).map(String::as_str)
    }
}

/// A task together with the fields the resolver derives from the full task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    /// The persisted record.
    #[serde(flatten)]
    pub task: Task,
    /// Tasks that name this task in their `blocked_by`.
    pub blocks: Vec<TaskId>,
    /// Tasks whose text mentions this task without an explicit relation.
    pub referenced_by: Vec<TaskId>,
    /// Blockers that are not completed, including unknown ids.
    pub unmet_blockers: Vec<TaskId>,
    /// Derived readiness.
    pub dependency_status: DependencyStatus,
}
