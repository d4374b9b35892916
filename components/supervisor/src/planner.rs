//! Planner Layer - Phase plans
//!
//! A phase plan is produced by an external collaborator. The engine only
//! needs the ordered phase names, so the collaborator sits behind
//! [`PhasePlanner`].

use thiserror::Error;

use crate::domain::{Task, Weight};

/// Planner failure.
#[derive(Debug, Error)]
#[error("phase planning failed: {0}")]
pub struct PlannerError(pub String);

/// Produces the ordered phase list for a task.
pub trait PhasePlanner: Send + Sync {
    /// Plans (or re-plans) `task`.
    ///
    /// # Errors
    /// Returns `PlannerError` if no plan can be produced.
    fn plan(&self, task: &Task) -> Result<Vec<String>, PlannerError>;
}

/// Planner deriving phases from the task weight alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightPlanner;

impl WeightPlanner {
    /// Creates a new weight-based planner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Phases used for a weight.
    #[must_use]
    pub const fn phases_for(weight: Weight) -> &'static [&'static str] {
        match weight {
            Weight::Small => &["implement", "review"],
            Weight::Medium => &["spec", "implement", "review"],
            Weight::Large => &["research", "spec", "implement", "test", "review", "docs"],
        }
    }
}

impl PhasePlanner for WeightPlanner {
    fn plan(&self, task: &Task) -> Result<Vec<String>, PlannerError> {
        Ok(Self::phases_for(task.weight)
            .iter()
            .map(|p| (*p).to_string())
            .collect())
    }
}
