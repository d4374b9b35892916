//! Domain Layer - Value Objects and Entities
//!
//! This module defines the core domain types for the engine.
//!
//! The domain module is organized into submodules:
//! - `ids`: Strongly-typed identifiers (`TaskId`, `InitiativeId`, `DecisionId`)
//! - `errors`: Error types for validation and parsing failures
//! - `task`: Task entity, status, weight, and gate decisions
//! - `initiative`: Initiative entity, junction refs, and decision log

pub use errors::{ParseEnumError, ValidationError};
pub use ids::{DecisionId, InitiativeId, TaskId};
pub use initiative::{Decision, Initiative, InitiativeStatus, InitiativeView, TaskRef};
pub use task::{
    DependencyStatus, GateDecision, GateType, Task, TaskStatus, TaskView, Weight,
};

mod errors;
mod ids;
mod initiative;
mod task;
