//! Keel orchestration engine.
//!
//! Tasks are units of work executed in phases; initiatives group tasks and
//! depend on one another. The engine:
//! 1. Resolves `blocked_by` graphs into readiness and rejects cycles
//! 2. Drives tasks through their lifecycle and gate approvals
//! 3. Keeps task and initiative membership consistent across both stored
//!    representations, completing initiatives once their tasks are done
//!
//! Persistence and event delivery are injected through [`EntityStore`] and
//! [`EventPublisher`]. No transport code lives here.

pub mod config;
pub mod consistency;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod graph;
pub mod initiatives;
pub mod planner;
pub mod repository;
pub mod snapshot;
pub mod tasks;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::{Event, EventKind, EventPublisher, PublishError};
pub use repository::{BatchInitiativeLoader, EntityStore, InMemoryStore, StoreError};
