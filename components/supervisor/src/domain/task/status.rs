//! Task domain - Lifecycle status, weight and derived dependency status

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::ParseEnumError;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task exists but has no phase plan yet.
    Created,
    /// A phase plan is attached; the task may be run.
    Planned,
    /// The executor is working on the task.
    Running,
    /// The current phase is waiting on a gate decision.
    Blocked,
    /// Execution is suspended and may be resumed.
    Paused,
    /// Task finished successfully.
    Completed,
    /// Task finished unsuccessfully or its gate was rejected.
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Planned,
        Self::Running,
        Self::Blocked,
        Self::Paused,
        Self::Completed,
        Self::Failed,
    ];

    /// Parses status from its string representation.
    ///
    /// # Errors
    /// Returns error for unknown status strings.
    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "planned" => Ok(Self::Planned),
            "running" => Ok(Self::Running),
            "blocked" => Ok(Self::Blocked),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseEnumError::new("task status", s)),
        }
    }

    /// Returns the storage-compatible string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Planned => "planned",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Checks if this is a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Checks whether a task in this status is a scheduling candidate.
    ///
    /// Completed and running tasks are never reported as ready.
    #[must_use]
    pub const fn is_schedulable(self) -> bool {
        !matches!(self, Self::Completed | Self::Running)
    }

    /// Checks whether a transition from this status to `target` is legal.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            // A phase plan moves a created task forward
            (Self::Created, Self::Planned)
                // Explicit run command
                | (Self::Planned | Self::Paused, Self::Running)
                // Executor-driven moves out of running
                | (
                    Self::Running,
                    Self::Blocked | Self::Paused | Self::Completed | Self::Failed
                )
                // Gate resolution
                | (Self::Blocked, Self::Planned | Self::Failed)
                // Retry
                | (Self::Failed, Self::Planned)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task size; drives the phase plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weight {
    /// A quick, single-phase change.
    Small,
    /// The default size.
    #[default]
    Medium,
    /// Multi-phase work with a specification step.
    Large,
}

impl Weight {
    /// Parses a weight from its string representation.
    ///
    /// # Errors
    /// Returns error for unknown weight strings.
    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(ParseEnumError::new("weight", s)),
        }
    }

    /// Returns the storage-compatible string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived readiness of a task with respect to its blockers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// The task is completed or running, so readiness does not apply.
    None,
    /// Every blocker is completed.
    Ready,
    /// At least one blocker is incomplete or unknown.
    Blocked,
}

impl DependencyStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ready => "ready",
            Self::Blocked => "blocked",
        }
    }
}
