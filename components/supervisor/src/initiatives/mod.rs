//! Initiative operations.
//!
//! [`InitiativeManager`] serves the initiative RPC surface. Membership changes
//! go through [`LinkRegistry`]; reads settle auto-completion through
//! [`CompletionTracker`] before returning.

mod execution;

pub use execution::{DependencyGraph, EdgeKind, GraphEdge, GraphNode, RunPlan};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::consistency::{CompletionTracker, LinkOutcome, LinkRegistry};
use crate::domain::{
    Decision, Initiative, InitiativeId, InitiativeStatus, InitiativeView, TaskId, TaskView,
};
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventKind, EventPublisher, emit};
use crate::graph::{dedupe_preserving_order, populate_initiative_views, populate_task_views, validate_blocked_by};
use crate::repository::EntityStore;

/// Arguments for [`InitiativeManager::create_initiative`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInitiative {
    /// Caller-chosen id; allocated as `INIT-NNN` when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Required title.
    pub title: String,
    /// Optional vision statement.
    #[serde(default)]
    pub vision: Option<String>,
    /// Optional owner.
    #[serde(default)]
    pub owner: Option<String>,
    /// Merge target; set to opt out of auto-completion.
    #[serde(default)]
    pub branch_base: Option<String>,
    /// Initial status; defaults to draft.
    #[serde(default)]
    pub status: Option<InitiativeStatus>,
    /// Initiatives that must complete first.
    #[serde(default)]
    pub blocked_by: Vec<InitiativeId>,
}

/// Field changes for [`InitiativeManager::update_initiative`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeUpdate {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New vision; empty clears it.
    #[serde(default)]
    pub vision: Option<String>,
    /// New owner; empty clears it.
    #[serde(default)]
    pub owner: Option<String>,
    /// New merge target; empty re-enables auto-completion.
    #[serde(default)]
    pub branch_base: Option<String>,
    /// New status.
    #[serde(default)]
    pub status: Option<InitiativeStatus>,
    /// Replacement blocker list.
    #[serde(default)]
    pub blocked_by: Option<Vec<InitiativeId>>,
}

/// Arguments for [`InitiativeManager::list_initiatives`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeQuery {
    /// Only initiatives in this status (evaluated after auto-completion).
    #[serde(default)]
    pub status: Option<InitiativeStatus>,
    /// 1-based page; defaults to 1.
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size; defaults and caps come from [`EngineConfig`].
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One page of initiatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativePage {
    /// Initiatives on this page.
    pub initiatives: Vec<InitiativeView>,
    /// Number of initiatives matching the filter across all pages.
    pub total_count: usize,
    /// Page served.
    pub page: u32,
    /// Page size used.
    pub limit: u32,
}

/// Initiative CRUD, membership, decisions and execution planning.
#[derive(Clone)]
pub struct InitiativeManager {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    registry: LinkRegistry,
    completion: CompletionTracker,
    config: EngineConfig,
}

impl InitiativeManager {
    /// Creates an initiative manager with injected collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        publisher: Arc<dyn EventPublisher>,
        registry: LinkRegistry,
        completion: CompletionTracker,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            registry,
            completion,
            config,
        }
    }

    /// Lists initiatives, settling auto-completion for every one first.
    ///
    /// A completion failure on one initiative is logged and does not fail the list.
    ///
    /// # Errors
    /// Returns `Store` if the initiative scan fails.
    #[instrument(skip(self))]
    pub async fn list_initiatives(&self, query: InitiativeQuery) -> EngineResult<InitiativePage> {
        let initiatives = self.store.load_all_initiatives().await?;
        let settled = self.completion.settle_all(initiatives).await;

        let page = query.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = self.config.page_limit(query.limit);
        let matching: Vec<InitiativeView> = populate_initiative_views(settled)
            .into_iter()
            .filter(|view| query.status.is_none_or(|s| view.initiative.status == s))
            .collect();
        let total_count = matching.len();
        let offset = (page as usize - 1).saturating_mul(limit as usize);
        let initiatives = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok(InitiativePage {
            initiatives,
            total_count,
            page,
            limit,
        })
    }

    /// Returns one initiative after settling its auto-completion.
    ///
    /// # Errors
    /// Returns `InitiativeNotFound`, or `Store` if a read or the completion write fails.
    #[instrument(skip(self), fields(initiative = %id))]
    pub async fn get_initiative(&self, id: &InitiativeId) -> EngineResult<InitiativeView> {
        let mut initiatives = self.store.load_all_initiatives().await?;
        let position = initiatives
            .iter()
            .position(|i| &i.id == id)
            .ok_or_else(|| EngineError::InitiativeNotFound(id.clone()))?;
        let settled = self.completion.settle(initiatives[position].clone()).await?;
        initiatives[position] = settled;
        populate_initiative_views(initiatives)
            .into_iter()
            .find(|view| &view.initiative.id == id)
            .ok_or_else(|| EngineError::InitiativeNotFound(id.clone()))
    }

    /// Creates an initiative.
    ///
    /// # Errors
    /// - `Validation` for a blank title or malformed id
    /// - `AlreadyExists` if the requested id is taken
    /// - `Graph` for unknown, self-referencing or cyclic blockers
    /// - `Store` if persistence fails
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_initiative(&self, request: NewInitiative) -> EngineResult<InitiativeView> {
        let existing = self.store.load_all_initiatives().await?;
        let id = match request.id.as_deref().filter(|id| !id.is_empty()) {
            Some(raw) => {
                let id = InitiativeId::parse(raw)?;
                if existing.iter().any(|i| i.id == id) {
                    return Err(EngineError::AlreadyExists {
                        entity: "initiative",
                        id: id.to_string(),
                    });
                }
                id
            }
            None => self.store.next_initiative_id().await?,
        };

        let mut initiative = Initiative::new(id.clone(), request.title)?;
        initiative.vision = request.vision.filter(|v| !v.is_empty());
        initiative.owner = request.owner.filter(|o| !o.is_empty());
        initiative.branch_base = request.branch_base.filter(|b| !b.is_empty());
        if let Some(status) = request.status {
            initiative.status = status;
        }
        initiative.blocked_by = dedupe_preserving_order(&request.blocked_by);
        validate_blocked_by(&id, &initiative.blocked_by, &existing)?;

        self.store.save_initiative(&initiative).await?;
        info!(initiative = %id, "Initiative created");
        self.publish(EventKind::InitiativeCreated, &id, serde_json::json!({ "title": &initiative.title }));
        self.get_initiative(&id).await
    }

    /// Applies field changes to an initiative.
    ///
    /// # Errors
    /// - `InitiativeNotFound` if the initiative does not exist
    /// - `Validation` / `Graph` for invalid fields
    /// - `Store` if persistence fails
    #[instrument(skip(self, update), fields(initiative = %id))]
    pub async fn update_initiative(
        &self,
        id: &InitiativeId,
        update: InitiativeUpdate,
    ) -> EngineResult<InitiativeView> {
        let all = self.store.load_all_initiatives().await?;
        let mut initiative = all
            .iter()
            .find(|i| &i.id == id)
            .cloned()
            .ok_or_else(|| EngineError::InitiativeNotFound(id.clone()))?;

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(crate::domain::ValidationError::EmptyTitle.into());
            }
            initiative.title = title;
        }
        if let Some(vision) = update.vision {
            initiative.vision = Some(vision).filter(|v| !v.is_empty());
        }
        if let Some(owner) = update.owner {
            initiative.owner = Some(owner).filter(|o| !o.is_empty());
        }
        if let Some(branch_base) = update.branch_base {
            initiative.branch_base = Some(branch_base).filter(|b| !b.is_empty());
        }
        if let Some(status) = update.status {
            initiative.status = status;
        }
        if let Some(blocked_by) = update.blocked_by {
            let blocked_by = dedupe_preserving_order(&blocked_by);
            validate_blocked_by(id, &blocked_by, &all)?;
            initiative.blocked_by = blocked_by;
        }

        initiative.touch();
        self.store.save_initiative(&initiative).await?;
        self.publish(EventKind::InitiativeUpdated, id, serde_json::json!({ "updated": true }));
        self.get_initiative(id).await
    }

    /// Deletes an initiative after releasing its member tasks and removing it
    /// from other initiatives' blockers.
    ///
    /// # Errors
    /// Returns `InitiativeNotFound` or `Store`.
    #[instrument(skip(self), fields(initiative = %id))]
    pub async fn delete_initiative(&self, id: &InitiativeId) -> EngineResult<()> {
        let all = self.store.load_all_initiatives().await?;
        if !all.iter().any(|i| &i.id == id) {
            return Err(EngineError::InitiativeNotFound(id.clone()));
        }

        let released = self.registry.release_all(id).await?;
        for mut other in all.into_iter().filter(|i| i.blocked_by.contains(id)) {
            other.blocked_by.retain(|b| b != id);
            other.touch();
            self.store.save_initiative(&other).await?;
            debug!(initiative = %other.id, "Removed deleted initiative from blockers");
        }
        self.store.delete_initiative(id).await?;

        info!(released, "Initiative deleted");
        self.publish(EventKind::InitiativeDeleted, id, serde_json::json!({ "released": released }));
        Ok(())
    }

    /// Returns the member tasks in junction order, with computed fields.
    ///
    /// # Errors
    /// Returns `InitiativeNotFound` or `Store`.
    pub async fn list_initiative_tasks(&self, id: &InitiativeId) -> EngineResult<Vec<TaskView>> {
        let members = self.member_ids(id).await?;
        let mut views = populate_task_views(self.store.load_all_tasks().await?);
        let mut ordered = Vec::with_capacity(members.len());
        for member in &members {
            if let Some(position) = views.iter().position(|v| &v.task.id == member) {
                ordered.push(views.swap_remove(position));
            }
        }
        Ok(ordered)
    }

    /// Links tasks into an initiative. See [`LinkRegistry::link`].
    ///
    /// # Errors
    /// Returns `InitiativeNotFound`, `InvalidArgument` or `Store`.
    pub async fn link_tasks(
        &self,
        id: &InitiativeId,
        task_ids: &[TaskId],
    ) -> EngineResult<LinkOutcome> {
        self.registry.link(id, task_ids).await
    }

    /// Detaches one task. See [`LinkRegistry::unlink`].
    ///
    /// # Errors
    /// Returns `TaskNotFound`, `Precondition` or `Store`.
    pub async fn unlink_task(&self, id: &InitiativeId, task_id: &TaskId) -> EngineResult<()> {
        self.registry.unlink(id, task_id).await
    }

    /// Appends a decision to the initiative's log.
    ///
    /// # Errors
    /// Returns `InitiativeNotFound`, `Validation` for blank text, or `Store`.
    #[instrument(skip(self, decision, rationale, by), fields(initiative = %id))]
    pub async fn add_decision(
        &self,
        id: &InitiativeId,
        decision: String,
        rationale: Option<String>,
        by: Option<String>,
    ) -> EngineResult<Decision> {
        let mut initiative = self.load(id).await?;
        let recorded = initiative.record_decision(decision, rationale, by)?.clone();
        self.store.save_initiative(&initiative).await?;
        info!(decision = %recorded.id, "Decision recorded");
        self.publish(
            EventKind::InitiativeUpdated,
            id,
            serde_json::json!({ "decision": &recorded.id }),
        );
        Ok(recorded)
    }

    async fn load(&self, id: &InitiativeId) -> EngineResult<Initiative> {
        self.store
            .load_initiative(id)
            .await?
            .ok_or_else(|| EngineError::InitiativeNotFound(id.clone()))
    }

    async fn member_ids(&self, id: &InitiativeId) -> EngineResult<Vec<TaskId>> {
        Ok(self.load(id).await?.tasks.into_iter().map(|r| r.id).collect())
    }

    fn publish(&self, kind: EventKind, id: &InitiativeId, payload: serde_json::Value) {
        emit(self.publisher.as_ref(), Event::new(kind, id.as_str(), payload));
    }
}
