//! Initiative domain module
//!
//! Initiatives group tasks through a junction list and carry their own
//! dependency graph and decision log.
pub mod entities;
pub mod status;

pub use entities::{Decision, Initiative, InitiativeView, TaskRef};
pub use status::InitiativeStatus;
