//! Repository Layer - Entity Store contract
//!
//! The engine depends on the [`EntityStore`] trait, not on a concrete
//! backend. The kernel provides a SQLite implementation; [`InMemoryStore`]
//! backs tests and embedded use.
//!
//! Stores expose no multi-entity transactions. A task write and the matching
//! junction write are two independent calls.

pub use memory::InMemoryStore;

mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Initiative, InitiativeId, Task, TaskId, TaskStatus};

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("storage backend failure: {0}")]
    Backend(String),
    /// A stored record could not be decoded.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Id of the unreadable record.
        id: String,
        /// Decoder message.
        reason: String,
    },
}

/// Contract for task and initiative persistence.
///
/// This trait abstracts the database layer, enabling:
/// - Unit testing with in-memory implementations
/// - Swapping storage backends without changing engine logic
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Loads one task.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails or the record is malformed.
    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Inserts or replaces a task.
    ///
    /// # Errors
    /// Returns `StoreError` if the write fails.
    async fn save_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Deletes a task. Deleting a missing task is not an error.
    ///
    /// # Errors
    /// Returns `StoreError` if the write fails.
    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError>;

    /// Loads every task, ordered by id.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn load_all_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Loads one initiative with its junction list resolved against stored tasks.
    ///
    /// Junction entries whose task no longer exists are omitted from `tasks`.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn load_initiative(&self, id: &InitiativeId) -> Result<Option<Initiative>, StoreError>;

    /// Inserts or replaces an initiative record. The `tasks` field is ignored;
    /// the junction list is only written through the junction methods.
    ///
    /// # Errors
    /// Returns `StoreError` if the write fails.
    async fn save_initiative(&self, initiative: &Initiative) -> Result<(), StoreError>;

    /// Deletes an initiative and its junction entries.
    ///
    /// # Errors
    /// Returns `StoreError` if the write fails.
    async fn delete_initiative(&self, id: &InitiativeId) -> Result<(), StoreError>;

    /// Loads every initiative, ordered by id, junction lists resolved.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn load_all_initiatives(&self) -> Result<Vec<Initiative>, StoreError>;

    /// Upserts a junction entry. An existing entry keeps its original sequence.
    ///
    /// # Errors
    /// Returns `StoreError` if the write fails.
    async fn add_task_to_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
        sequence: u32,
    ) -> Result<(), StoreError>;

    /// Removes a junction entry. Removing a missing entry is not an error.
    ///
    /// # Errors
    /// Returns `StoreError` if the write fails.
    async fn remove_task_from_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
    ) -> Result<(), StoreError>;

    /// Returns the raw junction list in sequence order, including entries whose
    /// task no longer exists.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn get_initiative_tasks(
        &self,
        initiative_id: &InitiativeId,
    ) -> Result<Vec<TaskId>, StoreError>;

    /// Returns the sequence a newly appended junction entry should take: one
    /// past the highest sequence in use, or 0 for an empty list.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn next_junction_sequence(&self, initiative_id: &InitiativeId) -> Result<u32, StoreError>;

    /// Allocates the next free `TASK-NNN` id.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn next_task_id(&self) -> Result<TaskId, StoreError>;

    /// Allocates the next free `INIT-NNN` id.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn next_initiative_id(&self) -> Result<InitiativeId, StoreError>;
}

/// Optional store capability: member task statuses for many initiatives in a
/// single round trip.
///
/// Stores that cannot do this better than a scan simply do not implement it;
/// the engine then falls back to one task scan per request.
#[async_trait]
pub trait BatchInitiativeLoader: Send + Sync {
    /// Returns, per requested initiative, the statuses of member tasks that
    /// exist. Initiatives without members map to an empty list.
    ///
    /// # Errors
    /// Returns `StoreError` if the read fails.
    async fn load_member_statuses(
        &self,
        initiative_ids: &[InitiativeId],
    ) -> Result<HashMap<InitiativeId, Vec<TaskStatus>>, StoreError>;
}
