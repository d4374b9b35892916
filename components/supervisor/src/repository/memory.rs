//! In-memory Entity Store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{EntityStore, StoreError};
use crate::domain::{Initiative, InitiativeId, Task, TaskId, TaskRef};

#[derive(Debug, Clone)]
struct JunctionEntry {
    task_id: TaskId,
    sequence: u32,
}

#[derive(Debug, Default)]
struct State {
    tasks: BTreeMap<TaskId, Task>,
    initiatives: BTreeMap<InitiativeId, Initiative>,
    junction: BTreeMap<InitiativeId, Vec<JunctionEntry>>,
    last_task_sequence: u64,
    last_initiative_sequence: u64,
}

impl State {
    fn resolve(&self, mut initiative: Initiative) -> Initiative {
        initiative.tasks = self
            .junction
            .get(&initiative.id)
            .into_iter()
            .flatten()
            .filter_map(|entry| self.tasks.get(&entry.task_id).map(TaskRef::from))
            .collect();
        initiative
    }
}

/// Process-local store backed by ordered maps behind a read-write lock.
///
/// Junction writes and task writes are separate calls, exactly as with a
/// database backend, so dual-write behaviour is exercised faithfully.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.state.read().tasks.get(id).cloned())
    }

    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if let Some(sequence) = task.id.sequence() {
            state.last_task_sequence = state.last_task_sequence.max(sequence);
        }
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        self.state.write().tasks.remove(id);
        Ok(())
    }

    async fn load_all_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.state.read().tasks.values().cloned().collect())
    }

    async fn load_initiative(&self, id: &InitiativeId) -> Result<Option<Initiative>, StoreError> {
        let state = self.state.read();
        Ok(state
            .initiatives
            .get(id)
            .cloned()
            .map(|initiative| state.resolve(initiative)))
    }

    async fn save_initiative(&self, initiative: &Initiative) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if let Some(sequence) = initiative.id.sequence() {
            state.last_initiative_sequence = state.last_initiative_sequence.max(sequence);
        }
        let mut record = initiative.clone();
        record.tasks.clear();
        state.initiatives.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_initiative(&self, id: &InitiativeId) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.initiatives.remove(id);
        state.junction.remove(id);
        Ok(())
    }

    async fn load_all_initiatives(&self) -> Result<Vec<Initiative>, StoreError> {
        let state = self.state.read();
        Ok(state
            .initiatives
            .values()
            .cloned()
            .map(|initiative| state.resolve(initiative))
            .collect())
    }

    async fn add_task_to_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
        sequence: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let entries = state.junction.entry(initiative_id.clone()).or_default();
        if entries.iter().any(|e| &e.task_id == task_id) {
            return Ok(());
        }
        entries.push(JunctionEntry {
            task_id: task_id.clone(),
            sequence,
        });
        entries.sort_by_key(|e| e.sequence);
        Ok(())
    }

    async fn remove_task_from_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
    ) -> Result<(), StoreError> {
        if let Some(entries) = self.state.write().junction.get_mut(initiative_id) {
            entries.retain(|e| &e.task_id != task_id);
        }
        Ok(())
    }

    async fn get_initiative_tasks(
        &self,
        initiative_id: &InitiativeId,
    ) -> Result<Vec<TaskId>, StoreError> {
        Ok(self
            .state
            .read()
            .junction
            .get(initiative_id)
            .map(|entries| entries.iter().map(|e| e.task_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn next_junction_sequence(&self, initiative_id: &InitiativeId) -> Result<u32, StoreError> {
        let state = self.state.read();
        let Some(last) = state
            .junction
            .get(initiative_id)
            .and_then(|entries| entries.iter().map(|e| e.sequence).max())
        else {
            return Ok(0);
        };
        last.checked_add(1).ok_or_else(|| {
            StoreError::Backend(format!("junction sequence exhausted for {initiative_id}"))
        })
    }

    async fn next_task_id(&self) -> Result<TaskId, StoreError> {
        let mut state = self.state.write();
        state.last_task_sequence = bump(state.last_task_sequence, "task")?;
        Ok(TaskId::from_sequence(state.last_task_sequence))
    }

    async fn next_initiative_id(&self) -> Result<InitiativeId, StoreError> {
        let mut state = self.state.write();
        state.last_initiative_sequence = bump(state.last_initiative_sequence, "initiative")?;
        Ok(InitiativeId::from_sequence(state.last_initiative_sequence))
    }
}

fn bump(last: u64, kind: &str) -> Result<u64, StoreError> {
    last.checked_add(1)
        .ok_or_else(|| StoreError::Backend(format!("{kind} id sequence exhausted")))
}
