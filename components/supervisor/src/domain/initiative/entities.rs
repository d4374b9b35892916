//! Initiative domain - Initiative entity, junction refs and decision log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::InitiativeStatus;
use crate::domain::ids::{InitiativeId, TaskId};
use crate::domain::task::{Task, TaskStatus};
use crate::domain::ValidationError;

/// Entry in an initiative's junction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    /// Linked task.
    pub id: TaskId,
    /// Task title at read time.
    pub title: String,
    /// Task status at read time.
    pub status: TaskStatus,
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
        }
    }
}

/// Entry in an initiative's append-only decision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Sequential id, `DEC-001`.
    pub id: String,
    /// When the decision was recorded.
    pub date: DateTime<Utc>,
    /// What was decided.
    pub decision: String,
    /// Why.
    #[serde(default)]
    pub rationale: Option<String>,
    /// Who decided.
    #[serde(default)]
    pub by: Option<String>,
}

/// Persisted initiative record.
///
/// `tasks` is the junction representation. It is stored independently of each
/// task's `initiative_id` and is populated by the store on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiative {
    /// Stable identifier.
    pub id: InitiativeId,
    /// Human-readable title.
    pub title: String,
    /// Optional statement of intent.
    #[serde(default)]
    pub vision: Option<String>,
    /// Lifecycle status.
    pub status: InitiativeStatus,
    /// Optional owner.
    #[serde(default)]
    pub owner: Option<String>,
    /// Branch the initiative's work merges into. A non-empty value opts out of
    /// auto-completion by task status.
    #[serde(default)]
    pub branch_base: Option<String>,
    /// Initiatives that must complete first.
    #[serde(default)]
    pub blocked_by: Vec<InitiativeId>,
    /// Junction list in insertion order.
    #[serde(default)]
    pub tasks: Vec<TaskRef>,
    /// Decision log.
    #[serde(default)]
    pub decisions: Vec<Decision>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Initiative {
    /// Constructs a new initiative in the `Draft` state.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyTitle` if the title is blank.
    pub fn new(id: InitiativeId, title: impl Into<String>) -> Result<Self, ValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let now = Utc::now();
        Ok(Self {
            id,
            title,
            vision: None,
            status: InitiativeStatus::Draft,
            owner: None,
            branch_base: None,
            blocked_by: Vec::new(),
            tasks: Vec::new(),
            decisions: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether completion is owned by a merge flow instead of task status.
    #[must_use]
    pub fn uses_merge_flow(&self) -> bool {
        self.branch_base.as_deref().is_some_and(|base| !base.is_empty())
    }

    /// Whether the junction list contains the given task.
    #[must_use]
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.tasks.iter().any(|r| &r.id == id)
    }

    /// Appends a decision with the next sequential `DEC-NNN` id.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyDecision` if the text is blank.
    pub fn record_decision(
        &mut self,
        decision: impl Into<String>,
        rationale: Option<String>,
        by: Option<String>,
    ) -> Result<&Decision, ValidationError> {
        let decision = decision.into();
        if decision.trim().is_empty() {
            return Err(ValidationError::EmptyDecision);
        }
        let id = format!("DEC-{:03}", self.decisions.len() + 1);
        self.decisions.push(Decision {
            id,
            date: Utc::now(),
            decision,
            rationale: rationale.filter(|r| !r.is_empty()),
            by: by.filter(|b| !b.is_empty()),
        });
        self.touch();
        Ok(&self.decisions[self.decisions.len() - 1])
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// An initiative together with its derived inter-initiative fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeView {
    /// The persisted record.
    #[serde(flatten)]
    pub initiative: Initiative,
    /// Initiatives naming this one in their `blocked_by`.
    pub blocks: Vec<InitiativeId>,
    /// Whether every blocking initiative is completed.
    pub blocked_by_met: bool,
}
