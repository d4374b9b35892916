//! Snapshot export and import.
//!
//! A snapshot is every task and initiative as stored. Import writes entities
//! first and junctions last, through [`LinkRegistry`], so both membership
//! representations agree afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::consistency::{LinkRegistry, ReconcileReport};
use crate::domain::{Initiative, Task, TaskId};
use crate::error::{EngineError, EngineResult};
use crate::repository::EntityStore;

/// Serialized state of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was taken.
    pub exported_at: DateTime<Utc>,
    /// Every task.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Every initiative, junction lists included.
    #[serde(default)]
    pub initiatives: Vec<Initiative>,
}

/// Result of [`SnapshotManager::export`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    /// The exported data.
    pub snapshot: Snapshot,
    /// Tasks plus initiatives exported.
    pub exported_count: usize,
}

/// How import treats ids that already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Fail with `AlreadyExists` before writing anything.
    #[default]
    Reject,
    /// Keep the stored entity and count it as skipped.
    Skip,
    /// Replace the stored entity.
    Overwrite,
}

/// Counts reported by [`SnapshotManager::import`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Tasks plus initiatives written.
    pub imported_count: usize,
    /// Tasks plus initiatives left untouched because they already existed.
    pub skipped_count: usize,
    /// Membership repairs made after the entities were written.
    pub reconcile: ReconcileReport,
}

/// Bulk export and import of the whole store.
#[derive(Clone)]
pub struct SnapshotManager {
    store: Arc<dyn EntityStore>,
    registry: LinkRegistry,
}

impl SnapshotManager {
    /// Creates a snapshot manager.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, registry: LinkRegistry) -> Self {
        Self { store, registry }
    }

    /// Exports every task and initiative.
    ///
    /// # Errors
    /// Returns `Store` if a read fails.
    #[instrument(skip(self))]
    pub async fn export(&self) -> EngineResult<ExportResult> {
        let tasks = self.store.load_all_tasks().await?;
        let initiatives = self.store.load_all_initiatives().await?;
        let exported_count = tasks.len() + initiatives.len();
        info!(exported_count, "Snapshot exported");
        Ok(ExportResult {
            snapshot: Snapshot {
                exported_at: Utc::now(),
                tasks,
                initiatives,
            },
            exported_count,
        })
    }

    /// Imports a snapshot.
    ///
    /// # Errors
    /// - `AlreadyExists` under [`ImportMode::Reject`] when any id is taken
    /// - `Store` if a read or write fails; entities written before the failure stay
    #[instrument(skip(self, snapshot), fields(tasks = snapshot.tasks.len(), initiatives = snapshot.initiatives.len()))]
    pub async fn import(&self, snapshot: Snapshot, mode: ImportMode) -> EngineResult<ImportReport> {
        let existing_tasks: HashSet<TaskId> = self
            .store
            .load_all_tasks()
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        let existing_initiatives: HashSet<_> = self
            .store
            .load_all_initiatives()
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();

        if mode == ImportMode::Reject {
            if let Some(task) = snapshot.tasks.iter().find(|t| existing_tasks.contains(&t.id)) {
                return Err(EngineError::AlreadyExists {
                    entity: "task",
                    id: task.id.to_string(),
                });
            }
            if let Some(initiative) = snapshot
                .initiatives
                .iter()
                .find(|i| existing_initiatives.contains(&i.id))
            {
                return Err(EngineError::AlreadyExists {
                    entity: "initiative",
                    id: initiative.id.to_string(),
                });
            }
        }

        let mut report = ImportReport::default();
        for task in &snapshot.tasks {
            if mode == ImportMode::Skip && existing_tasks.contains(&task.id) {
                report.skipped_count += 1;
                continue;
            }
            self.store.save_task(task).await?;
            report.imported_count += 1;
        }

        let mut written = Vec::new();
        for initiative in &snapshot.initiatives {
            if mode == ImportMode::Skip && existing_initiatives.contains(&initiative.id) {
                report.skipped_count += 1;
                continue;
            }
            self.store.save_initiative(initiative).await?;
            report.imported_count += 1;
            written.push(initiative);
        }

        // Junction order comes from the snapshot; only refs whose task still
        // claims the initiative are linked, so back-references are not moved.
        let tasks = self.store.load_all_tasks().await?;
        for initiative in written {
            let members: Vec<TaskId> = initiative
                .tasks
                .iter()
                .filter(|r| {
                    tasks
                        .iter()
                        .any(|t| t.id == r.id && t.initiative_id.as_ref() == Some(&initiative.id))
                })
                .map(|r| r.id.clone())
                .collect();
            if !members.is_empty() {
                self.registry.link(&initiative.id, &members).await?;
            }
        }
        report.reconcile = self.registry.reconcile().await?;

        info!(
            imported = report.imported_count,
            skipped = report.skipped_count,
            repairs = report.reconcile.total(),
            "Snapshot imported"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::MissingTaskPolicy;
    use crate::domain::{InitiativeId, TaskStatus};
    use crate::events::NoopPublisher;
    use crate::repository::InMemoryStore;

    fn manager() -> (Arc<InMemoryStore>, SnapshotManager) {
        let store = Arc::new(InMemoryStore::new());
        let registry = LinkRegistry::new(store.clone(), Arc::new(NoopPublisher), MissingTaskPolicy::Skip);
        (store.clone(), SnapshotManager::new(store, registry))
    }

    async fn populated() -> Snapshot {
        let (store, snapshots) = manager();
        let initiative = Initiative::new(InitiativeId::from_sequence(1), "Auth").unwrap();
        store.save_initiative(&initiative).await.unwrap();
        for n in [2, 1] {
            let mut task = Task::new(TaskId::from_sequence(n), format!("Task {n}")).unwrap();
            task.initiative_id = Some(initiative.id.clone());
            task.status = TaskStatus::Planned;
            store.save_task(&task).await.unwrap();
            store
                .add_task_to_initiative(&initiative.id, &task.id, u32::try_from(2 - n).unwrap())
                .await
                .unwrap();
        }
        let exported = snapshots.export().await.unwrap();
        assert_eq!(exported.exported_count, 3);
        exported.snapshot
    }

    #[tokio::test]
    async fn import_preserves_junction_order() {
        let snapshot = populated().await;
        let (store, snapshots) = manager();
        let report = snapshots.import(snapshot, ImportMode::Reject).await.unwrap();
        assert_eq!(report.imported_count, 3);
        assert!(report.reconcile.is_clean());
        assert_eq!(
            store
                .get_initiative_tasks(&InitiativeId::from_sequence(1))
                .await
                .unwrap(),
            vec![TaskId::from_sequence(2), TaskId::from_sequence(1)]
        );
    }

    #[tokio::test]
    async fn reject_mode_writes_nothing_on_duplicates() {
        let snapshot = populated().await;
        let (store, snapshots) = manager();
        let existing = Task::new(TaskId::from_sequence(1), "Already here").unwrap();
        store.save_task(&existing).await.unwrap();

        let err = snapshots.import(snapshot, ImportMode::Reject).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { entity: "task", .. }));
        assert_eq!(store.load_all_tasks().await.unwrap().len(), 1);
        assert!(store.load_all_initiatives().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_and_overwrite_modes() {
        let snapshot = populated().await;
        let (store, snapshots) = manager();
        let existing = Task::new(TaskId::from_sequence(1), "Already here").unwrap();
        store.save_task(&existing).await.unwrap();

        let report = snapshots.import(snapshot.clone(), ImportMode::Skip).await.unwrap();
        assert_eq!(report.skipped_count, 1);
        assert_eq!(report.imported_count, 2);
        let kept = store.load_task(&existing.id).await.unwrap().unwrap();
        assert_eq!(kept.title, "Already here");

        let report = snapshots.import(snapshot, ImportMode::Overwrite).await.unwrap();
        assert_eq!(report.imported_count, 3);
        let replaced = store.load_task(&existing.id).await.unwrap().unwrap();
        assert_eq!(replaced.title, "Task 1");
        assert_eq!(replaced.initiative_id, Some(InitiativeId::from_sequence(1)));
    }
}
