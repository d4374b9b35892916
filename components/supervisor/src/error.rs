//! Engine error taxonomy.
//!
//! Every failure carries a human-readable message and maps onto one
//! [`ErrorKind`], which is what transports translate into status codes.

use core::fmt;

use thiserror::Error;

use crate::domain::{
    DecisionId, InitiativeId, ParseEnumError, TaskId, TaskStatus, ValidationError,
};
use crate::graph::GraphError;
use crate::planner::PlannerError;
use crate::repository::StoreError;

/// Coarse error category exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed input.
    InvalidArgument,
    /// A referenced entity does not exist.
    NotFound,
    /// The entity's current state forbids the operation.
    FailedPrecondition,
    /// The request is based on stale state.
    Conflict,
    /// The operation would create a disallowed duplicate.
    AlreadyExists,
    /// Persistence failure.
    Internal,
}

impl ErrorKind {
    /// Returns the canonical snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::FailedPrecondition => "failed_precondition",
            Self::Conflict => "conflict",
            Self::AlreadyExists => "already_exists",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Domain validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An enum value could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseEnumError),
    /// A request argument is missing or malformed.
    #[error("{0}")]
    InvalidArgument(String),
    /// A reference is unknown, self-referential, or closes a cycle.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Task lookup failed.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    /// Initiative lookup failed.
    #[error("initiative {0} not found")]
    InitiativeNotFound(InitiativeId),
    /// Pending decision lookup failed, or it was already resolved.
    #[error("pending decision {0} not found")]
    DecisionNotFound(DecisionId),
    /// The task's status does not allow the requested transition.
    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task being transitioned.
        id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },
    /// The entity's state forbids the operation.
    #[error("{0}")]
    Precondition(String),
    /// A decision was recorded for a phase the task has since left.
    #[error(
        "decision {decision} is stale: recorded for phase {recorded}, task {task} is in phase {current}"
    )]
    StaleDecision {
        /// Decision being resolved.
        decision: DecisionId,
        /// Task the decision belongs to.
        task: TaskId,
        /// Phase captured when the decision was requested.
        recorded: String,
        /// Phase the task is in now.
        current: String,
    },
    /// The entity already exists.
    #[error("{entity} {id} already exists")]
    AlreadyExists {
        /// Entity type.
        entity: &'static str,
        /// Duplicate id.
        id: String,
    },
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The phase planner failed.
    #[error(transparent)]
    Planning(#[from] PlannerError),
}

impl EngineError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Parse(_) | Self::InvalidArgument(_) | Self::Graph(_) => {
                ErrorKind::InvalidArgument
            }
            Self::TaskNotFound(_) | Self::InitiativeNotFound(_) | Self::DecisionNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidTransition { .. } | Self::Precondition(_) => {
                ErrorKind::FailedPrecondition
            }
            Self::StaleDecision { .. } => ErrorKind::Conflict,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Store(_) | Self::Planning(_) => ErrorKind::Internal,
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
