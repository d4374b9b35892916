//! Dual-write link registry.
//!
//! Writes go task first, junction second. Both flows (link and unlink) treat
//! the task back-reference as authoritative, which is what [`LinkRegistry::reconcile`]
//! repairs towards when a crash or failed write leaves the two apart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::{Initiative, InitiativeId, TaskId};
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventKind, EventPublisher, emit};
use crate::graph::dedupe_preserving_order;
use crate::repository::EntityStore;

/// How `link` treats task ids that do not resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTaskPolicy {
    /// Ignore the id and continue.
    #[default]
    Skip,
    /// Continue, but report the id in [`LinkOutcome::missing`].
    Report,
}

/// Result of a batch link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    /// The target initiative, re-read after linking.
    pub initiative: Initiative,
    /// Ids now linked to the initiative.
    pub linked: Vec<TaskId>,
    /// Ids that did not resolve. Always empty under [`MissingTaskPolicy::Skip`].
    pub missing: Vec<TaskId>,
}

impl LinkOutcome {
    /// Whether some requested ids were not linked.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Repairs made by a reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Junction entries added for tasks claiming an initiative.
    pub junctions_added: usize,
    /// Junction entries removed because their task is gone or claims another initiative.
    pub junctions_removed: usize,
    /// Task back-references cleared because the initiative no longer exists.
    pub back_refs_cleared: usize,
}

impl ReconcileReport {
    /// Whether the pass found nothing to repair.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.junctions_added == 0 && self.junctions_removed == 0 && self.back_refs_cleared == 0
    }

    /// Total number of repairs.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.junctions_added + self.junctions_removed + self.back_refs_cleared
    }
}

/// Single entry point for task-to-initiative membership changes.
#[derive(Clone)]
pub struct LinkRegistry {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    policy: MissingTaskPolicy,
}

impl LinkRegistry {
    /// Creates a registry over the given store.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        publisher: Arc<dyn EventPublisher>,
        policy: MissingTaskPolicy,
    ) -> Self {
        Self {
            store,
            publisher,
            policy,
        }
    }

    /// Returns the configured missing-task policy.
    #[must_use]
    pub const fn policy(&self) -> MissingTaskPolicy {
        self.policy
    }

    /// Links each task to `initiative_id`, moving it out of any other initiative.
    ///
    /// Ids are processed independently. An unknown id is skipped (and reported
    /// under [`MissingTaskPolicy::Report`]); failing to detach a task from its
    /// previous initiative is logged and does not stop the link. Re-linking an
    /// already linked task keeps its junction position.
    ///
    /// # Errors
    /// - `InvalidArgument` if `task_ids` is empty
    /// - `InitiativeNotFound` if the initiative does not exist
    /// - `Store` if a task or junction write fails; earlier ids stay linked
    #[instrument(skip(self, task_ids), fields(initiative = %initiative_id, requested = task_ids.len()))]
    pub async fn link(
        &self,
        initiative_id: &InitiativeId,
        task_ids: &[TaskId],
    ) -> EngineResult<LinkOutcome> {
        if self.store.load_initiative(initiative_id).await?.is_none() {
            return Err(EngineError::InitiativeNotFound(initiative_id.clone()));
        }
        if task_ids.is_empty() {
            return Err(EngineError::InvalidArgument(
                "at least one task id is required".into(),
            ));
        }

        let mut junction = self.store.get_initiative_tasks(initiative_id).await?;
        let mut next_sequence = self.store.next_junction_sequence(initiative_id).await?;
        let mut linked = Vec::new();
        let mut missing = Vec::new();

        for task_id in dedupe_preserving_order(task_ids) {
            let Some(mut task) = self.store.load_task(&task_id).await? else {
                metrics::counter!("keel_link_missing_total").increment(1);
                match self.policy {
                    MissingTaskPolicy::Skip => debug!(task = %task_id, "Skipping unknown task"),
                    MissingTaskPolicy::Report => {
                        warn!(task = %task_id, "Cannot link unknown task");
                        missing.push(task_id);
                    }
                }
                continue;
            };

            if let Some(previous) = task
                .initiative_id
                .clone()
                .filter(|previous| previous != initiative_id)
            {
                if let Err(e) = self
                    .store
                    .remove_task_from_initiative(&previous, &task_id)
                    .await
                {
                    warn!(
                        task = %task_id,
                        previous = %previous,
                        error = %e,
                        "Failed to detach task from previous initiative; reconcile will repair"
                    );
                } else {
                    debug!(task = %task_id, previous = %previous, "Detached task from previous initiative");
                }
            }

            if task.initiative_id.as_ref() != Some(initiative_id) {
                task.initiative_id = Some(initiative_id.clone());
                task.touch();
                self.store.save_task(&task).await?;
            }

            if !junction.contains(&task_id) {
                self.store
                    .add_task_to_initiative(initiative_id, &task_id, next_sequence)
                    .await?;
                junction.push(task_id.clone());
                next_sequence = next_sequence.saturating_add(1);
            }
            linked.push(task_id);
        }

        metrics::counter!("keel_tasks_linked_total").increment(linked.len() as u64);
        let initiative = self
            .store
            .load_initiative(initiative_id)
            .await?
            .ok_or_else(|| EngineError::InitiativeNotFound(initiative_id.clone()))?;

        info!(linked = linked.len(), missing = missing.len(), "Linked tasks");
        emit(
            self.publisher.as_ref(),
            Event::new(
                EventKind::InitiativeUpdated,
                initiative_id.as_str(),
                serde_json::json!({ "linked": &linked, "missing": &missing }),
            ),
        );

        Ok(LinkOutcome {
            initiative,
            linked,
            missing,
        })
    }

    /// Detaches a task from the initiative it is linked to.
    ///
    /// # Errors
    /// - `TaskNotFound` if the task does not exist
    /// - `Precondition` if the task is not linked to `initiative_id`
    /// - `Store` if a write fails
    #[instrument(skip(self), fields(initiative = %initiative_id, task = %task_id))]
    pub async fn unlink(&self, initiative_id: &InitiativeId, task_id: &TaskId) -> EngineResult<()> {
        let mut task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))?;

        if task.initiative_id.as_ref() != Some(initiative_id) {
            return Err(EngineError::Precondition(format!(
                "task {task_id} is not linked to initiative {initiative_id}"
            )));
        }

        task.initiative_id = None;
        task.touch();
        self.store.save_task(&task).await?;
        self.store
            .remove_task_from_initiative(initiative_id, task_id)
            .await?;

        info!("Unlinked task");
        emit(
            self.publisher.as_ref(),
            Event::new(
                EventKind::InitiativeUpdated,
                initiative_id.as_str(),
                serde_json::json!({ "unlinked": task_id }),
            ),
        );
        Ok(())
    }

    /// Clears the back-reference of every task claiming `initiative_id` and
    /// empties its junction list. Used before deleting the initiative.
    ///
    /// # Errors
    /// Returns `Store` if a read or write fails.
    #[instrument(skip(self), fields(initiative = %initiative_id))]
    pub async fn release_all(&self, initiative_id: &InitiativeId) -> EngineResult<usize> {
        let mut released = 0;
        for mut task in self.store.load_all_tasks().await? {
            if task.initiative_id.as_ref() == Some(initiative_id) {
                task.initiative_id = None;
                task.touch();
                self.store.save_task(&task).await?;
                released += 1;
            }
        }
        for task_id in self.store.get_initiative_tasks(initiative_id).await? {
            self.store
                .remove_task_from_initiative(initiative_id, &task_id)
                .await?;
        }
        debug!(released, "Released initiative members");
        Ok(released)
    }

    /// Brings the junction lists in line with task back-references.
    ///
    /// Idempotent: a second pass over an unchanged store reports nothing.
    ///
    /// # Errors
    /// Returns `Store` if a read or write fails.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> EngineResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let tasks = self.store.load_all_tasks().await?;
        let initiatives: HashSet<InitiativeId> = self
            .store
            .load_all_initiatives()
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();

        let mut junctions: HashMap<InitiativeId, Vec<TaskId>> = HashMap::new();
        for id in &initiatives {
            junctions.insert(id.clone(), self.store.get_initiative_tasks(id).await?);
        }

        let claims: HashMap<&TaskId, Option<&InitiativeId>> = tasks
            .iter()
            .map(|t| (&t.id, t.initiative_id.as_ref()))
            .collect();

        for (initiative_id, members) in &junctions {
            for task_id in members {
                let claimed = claims.get(task_id).copied().flatten();
                if claimed != Some(initiative_id) {
                    warn!(initiative = %initiative_id, task = %task_id, "Removing stale junction entry");
                    self.store
                        .remove_task_from_initiative(initiative_id, task_id)
                        .await?;
                    report.junctions_removed += 1;
                }
            }
        }

        for task in &tasks {
            let Some(initiative_id) = &task.initiative_id else {
                continue;
            };
            match junctions.get_mut(initiative_id) {
                None => {
                    warn!(task = %task.id, initiative = %initiative_id, "Clearing reference to missing initiative");
                    let mut repaired = task.clone();
                    repaired.initiative_id = None;
                    repaired.touch();
                    self.store.save_task(&repaired).await?;
                    report.back_refs_cleared += 1;
                }
                Some(members) if !members.contains(&task.id) => {
                    warn!(task = %task.id, initiative = %initiative_id, "Restoring missing junction entry");
                    let sequence = self.store.next_junction_sequence(initiative_id).await?;
                    self.store
                        .add_task_to_initiative(initiative_id, &task.id, sequence)
                        .await?;
                    members.push(task.id.clone());
                    report.junctions_added += 1;
                }
                Some(_) => {}
            }
        }

        metrics::counter!("keel_reconcile_repairs_total").increment(report.total() as u64);
        if report.is_clean() {
            debug!("Link registry consistent");
        } else {
            info!(
                added = report.junctions_added,
                removed = report.junctions_removed,
                cleared = report.back_refs_cleared,
                "Reconciled link registry"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use crate::events::NoopPublisher;
    use crate::repository::InMemoryStore;

    async fn setup(policy: MissingTaskPolicy) -> (Arc<InMemoryStore>, LinkRegistry) {
        let store = Arc::new(InMemoryStore::new());
        for n in 1..=2 {
            let init = Initiative::new(InitiativeId::from_sequence(n), format!("I{n}")).unwrap();
            store.save_initiative(&init).await.unwrap();
        }
        for n in 1..=3 {
            let task = Task::new(TaskId::from_sequence(n), format!("T{n}")).unwrap();
            store.save_task(&task).await.unwrap();
        }
        let registry = LinkRegistry::new(store.clone(), Arc::new(NoopPublisher), policy);
        (store, registry)
    }

    fn init(n: u64) -> InitiativeId {
        InitiativeId::from_sequence(n)
    }

    fn task(n: u64) -> TaskId {
        TaskId::from_sequence(n)
    }

    #[tokio::test]
    async fn link_requires_ids_and_existing_initiative() {
        let (_, registry) = setup(MissingTaskPolicy::Skip).await;
        let err = registry.link(&init(1), &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        let err = registry.link(&init(9), &[task(1)]).await.unwrap_err();
        assert!(matches!(err, EngineError::InitiativeNotFound(_)));
    }

    #[tokio::test]
    async fn relink_is_idempotent_and_keeps_order() {
        let (store, registry) = setup(MissingTaskPolicy::Skip).await;
        registry.link(&init(1), &[task(2), task(1)]).await.unwrap();
        let outcome = registry.link(&init(1), &[task(1), task(3)]).await.unwrap();

        let ids: Vec<TaskId> = outcome.initiative.tasks.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![task(2), task(1), task(3)]);
        assert_eq!(
            store.get_initiative_tasks(&init(1)).await.unwrap(),
            vec![task(2), task(1), task(3)]
        );
    }

    #[tokio::test]
    async fn missing_ids_follow_policy() {
        let (_, registry) = setup(MissingTaskPolicy::Skip).await;
        let outcome = registry.link(&init(1), &[task(1), task(42)]).await.unwrap();
        assert_eq!(outcome.linked, vec![task(1)]);
        assert!(outcome.missing.is_empty());

        let (_, registry) = setup(MissingTaskPolicy::Report).await;
        let outcome = registry.link(&init(1), &[task(1), task(42)]).await.unwrap();
        assert_eq!(outcome.linked, vec![task(1)]);
        assert_eq!(outcome.missing, vec![task(42)]);
        assert!(outcome.is_partial());
    }

    #[tokio::test]
    async fn unlink_checks_ownership_first() {
        let (store, registry) = setup(MissingTaskPolicy::Skip).await;
        registry.link(&init(1), &[task(1)]).await.unwrap();

        let err = registry.unlink(&init(2), &task(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
        assert_eq!(
            store.load_task(&task(1)).await.unwrap().unwrap().initiative_id,
            Some(init(1))
        );

        let err = registry.unlink(&init(1), &task(9)).await.unwrap_err();
        assert!(matches!(err, EngineError::TaskNotFound(_)));

        registry.unlink(&init(1), &task(1)).await.unwrap();
        assert!(store.get_initiative_tasks(&init(1)).await.unwrap().is_empty());
        assert_eq!(store.load_task(&task(1)).await.unwrap().unwrap().initiative_id, None);
    }

    #[tokio::test]
    async fn reconcile_repairs_both_directions() {
        let (store, registry) = setup(MissingTaskPolicy::Skip).await;

        // Task claims I1 but the junction write never happened.
        let mut claimed = store.load_task(&task(1)).await.unwrap().unwrap();
        claimed.initiative_id = Some(init(1));
        store.save_task(&claimed).await.unwrap();
        // Junction lists T2 under I2 but T2 claims nothing.
        store.add_task_to_initiative(&init(2), &task(2), 0).await.unwrap();
        // Task claims an initiative that does not exist.
        let mut orphan = store.load_task(&task(3)).await.unwrap().unwrap();
        orphan.initiative_id = Some(init(7));
        store.save_task(&orphan).await.unwrap();

        let report = registry.reconcile().await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                junctions_added: 1,
                junctions_removed: 1,
                back_refs_cleared: 1,
            }
        );
        assert_eq!(store.get_initiative_tasks(&init(1)).await.unwrap(), vec![task(1)]);
        assert!(store.get_initiative_tasks(&init(2)).await.unwrap().is_empty());
        assert_eq!(store.load_task(&task(3)).await.unwrap().unwrap().initiative_id, None);

        assert!(registry.reconcile().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn link_after_unlink_appends_at_the_end() {
        let (store, registry) = setup(MissingTaskPolicy::Skip).await;
        let fourth = Task::new(task(4), "T4").unwrap();
        store.save_task(&fourth).await.unwrap();

        registry.link(&init(1), &[task(1), task(2), task(3)]).await.unwrap();
        registry.unlink(&init(1), &task(1)).await.unwrap();
        registry.unlink(&init(1), &task(2)).await.unwrap();
        registry.link(&init(1), &[task(4)]).await.unwrap();

        assert_eq!(
            store.get_initiative_tasks(&init(1)).await.unwrap(),
            vec![task(3), task(4)]
        );
    }

    #[tokio::test]
    async fn reconcile_appends_restored_entries_after_survivors() {
        let (store, registry) = setup(MissingTaskPolicy::Skip).await;
        registry.link(&init(1), &[task(1), task(2)]).await.unwrap();
        registry.unlink(&init(1), &task(1)).await.unwrap();

        let mut claimed = store.load_task(&task(3)).await.unwrap().unwrap();
        claimed.initiative_id = Some(init(1));
        store.save_task(&claimed).await.unwrap();

        assert_eq!(registry.reconcile().await.unwrap().junctions_added, 1);
        assert_eq!(
            store.get_initiative_tasks(&init(1)).await.unwrap(),
            vec![task(2), task(3)]
        );
    }

    #[tokio::test]
    async fn release_all_clears_members() {
        let (store, registry) = setup(MissingTaskPolicy::Skip).await;
        registry.link(&init(1), &[task(1), task(2)]).await.unwrap();
        assert_eq!(registry.release_all(&init(1)).await.unwrap(), 2);
        assert!(store.get_initiative_tasks(&init(1)).await.unwrap().is_empty());
        assert_eq!(store.load_task(&task(2)).await.unwrap().unwrap().initiative_id, None);
    }
}
