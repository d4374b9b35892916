//! Task domain module
//!
//! This module defines task-related domain types including the Task entity,
//! lifecycle status, weight, and recorded gate decisions.
pub mod entities;
pub mod gate;
pub mod status;

pub use entities::{Task, TaskView};
pub use gate::{GateDecision, GateType};
pub use status::{DependencyStatus, TaskStatus, Weight};
