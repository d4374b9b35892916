//! Gate Decision Workflow
//!
//! Tracks outstanding approval requests for blocked tasks and resolves them
//! into task status transitions.

mod pending;
mod workflow;

pub use pending::{PendingDecision, PendingDecisionStore};
pub use workflow::{DecisionRequest, GateWorkflow, ResolvedDecision};
