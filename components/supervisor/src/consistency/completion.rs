//! Initiative auto-completion.
//!
//! [`evaluate_completion`] is a pure decision over an initiative and the
//! statuses of its member tasks. [`CompletionTracker`] gathers those statuses,
//! applies the decision and persists it as a separate step.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::domain::{Initiative, InitiativeId, InitiativeStatus, TaskStatus};
use crate::error::EngineResult;
use crate::events::{Event, EventKind, EventPublisher, emit};
use crate::repository::{BatchInitiativeLoader, EntityStore};

/// Outcome of evaluating one initiative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Nothing to change.
    Unchanged(Initiative),
    /// The initiative was moved to `Completed` and must be persisted.
    Completed(Initiative),
}

impl Completion {
    /// Whether the evaluation changed the initiative.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the (possibly updated) initiative.
    #[must_use]
    pub fn into_inner(self) -> Initiative {
        match self {
            Self::Unchanged(initiative) | Self::Completed(initiative) => initiative,
        }
    }
}

/// Decides whether `initiative` is complete given the statuses of its members.
///
/// Initiatives using a merge flow, already completed, or without members are
/// left alone. Otherwise the initiative completes once every member task is
/// completed.
#[must_use]
pub fn evaluate_completion(mut initiative: Initiative, member_statuses: &[TaskStatus]) -> Completion {
    if initiative.uses_merge_flow()
        || initiative.status == InitiativeStatus::Completed
        || member_statuses.is_empty()
        || member_statuses.iter().any(|s| *s != TaskStatus::Completed)
    {
        return Completion::Unchanged(initiative);
    }
    initiative.status = InitiativeStatus::Completed;
    initiative.touch();
    Completion::Completed(initiative)
}

/// Where member task statuses come from, fixed when the engine is built.
#[derive(Clone)]
pub enum StatusSource {
    /// The store answers in one batched read.
    Batch(Arc<dyn BatchInitiativeLoader>),
    /// Scan all tasks once and walk each junction list.
    Scan,
}

impl std::fmt::Debug for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Batch(_) => f.write_str("Batch"),
            Self::Scan => f.write_str("Scan"),
        }
    }
}

/// Applies [`evaluate_completion`] on read paths and persists the result.
#[derive(Clone)]
pub struct CompletionTracker {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    source: StatusSource,
}

impl CompletionTracker {
    /// Creates a tracker using the given status source.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        publisher: Arc<dyn EventPublisher>,
        source: StatusSource,
    ) -> Self {
        Self {
            store,
            publisher,
            source,
        }
    }

    /// Loads member task statuses for each initiative. Dangling junction
    /// entries are ignored.
    ///
    /// # Errors
    /// Returns `Store` if a read fails.
    pub async fn member_statuses(
        &self,
        initiative_ids: &[InitiativeId],
    ) -> EngineResult<HashMap<InitiativeId, Vec<TaskStatus>>> {
        match &self.source {
            StatusSource::Batch(loader) => Ok(loader.load_member_statuses(initiative_ids).await?),
            StatusSource::Scan => {
                let statuses: HashMap<_, _> = self
                    .store
                    .load_all_tasks()
                    .await?
                    .into_iter()
                    .map(|t| (t.id, t.status))
                    .collect();
                let mut members = HashMap::with_capacity(initiative_ids.len());
                for id in initiative_ids {
                    let resolved = self
                        .store
                        .get_initiative_tasks(id)
                        .await?
                        .iter()
                        .filter_map(|task_id| statuses.get(task_id).copied())
                        .collect();
                    members.insert(id.clone(), resolved);
                }
                Ok(members)
            }
        }
    }

    /// Evaluates and persists completion for a single initiative.
    ///
    /// # Errors
    /// Returns `Store` if the status read or the write fails.
    #[instrument(skip(self, initiative), fields(initiative = %initiative.id))]
    pub async fn settle(&self, initiative: Initiative) -> EngineResult<Initiative> {
        let mut statuses = self
            .member_statuses(std::slice::from_ref(&initiative.id))
            .await?;
        let members = statuses.remove(&initiative.id).unwrap_or_default();
        self.persist(evaluate_completion(initiative, &members)).await
    }

    /// Evaluates completion for a list of initiatives. A failure on one
    /// initiative is logged and that initiative is returned unchanged.
    #[instrument(skip(self, initiatives), fields(count = initiatives.len()))]
    pub async fn settle_all(&self, initiatives: Vec<Initiative>) -> Vec<Initiative> {
        let ids: Vec<InitiativeId> = initiatives.iter().map(|i| i.id.clone()).collect();
        let mut statuses = match self.member_statuses(&ids).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(error = %e, "Could not load member statuses; skipping completion");
                return initiatives;
            }
        };

        let mut settled = Vec::with_capacity(initiatives.len());
        for initiative in initiatives {
            let members = statuses.remove(&initiative.id).unwrap_or_default();
            let completion = evaluate_completion(initiative.clone(), &members);
            match self.persist(completion).await {
                Ok(updated) => settled.push(updated),
                Err(e) => {
                    warn!(initiative = %initiative.id, error = %e, "Completion update failed");
                    settled.push(initiative);
                }
            }
        }
        settled
    }

    async fn persist(&self, completion: Completion) -> EngineResult<Initiative> {
        let initiative = match completion {
            Completion::Completed(initiative) => initiative,
            Completion::Unchanged(initiative) => {
                debug!(initiative = %initiative.id, "Initiative unchanged");
                return Ok(initiative);
            }
        };
        self.store.save_initiative(&initiative).await?;
        metrics::counter!("keel_initiatives_autocompleted_total").increment(1);
        info!(initiative = %initiative.id, "Initiative auto-completed");
        emit(
            self.publisher.as_ref(),
            Event::new(
                EventKind::InitiativeUpdated,
                initiative.id.as_str(),
                serde_json::json!({ "status": initiative.status, "auto_completed": true }),
            ),
        );
        Ok(initiative)
    }
}
