//! In-process store of pending gate decisions.
//!
//! The store is not durable. After a restart it is rebuilt from tasks in the
//! `Blocked` state (see `GateWorkflow::rebuild`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::{DecisionId, GateType, InitiativeId, TaskId};

/// An outstanding approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDecision {
    /// Generated id used to resolve the request.
    pub decision_id: DecisionId,
    /// Blocked task.
    pub task_id: TaskId,
    /// Initiative the task belonged to when the request was made.
    pub initiative_id: Option<InitiativeId>,
    /// Phase the gate guards.
    pub phase: String,
    /// Kind of gate.
    pub gate_type: GateType,
    /// Question put to the approver.
    pub question: String,
    /// Supporting context for the approver.
    pub context: String,
    /// When the request was made.
    pub requested_at: DateTime<Utc>,
}

impl PendingDecision {
    fn same_gate(&self, other: &Self) -> bool {
        self.task_id == other.task_id
            && self.phase == other.phase
            && self.gate_type == other.gate_type
    }
}

/// Shared, mutex-guarded map of pending decisions.
///
/// Resolution claims an entry by removing it under the lock, so at most one
/// caller can hold a given decision at a time.
#[derive(Debug, Default)]
pub struct PendingDecisionStore {
    inner: Mutex<HashMap<DecisionId, PendingDecision>>,
}

impl PendingDecisionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `candidate` unless a decision for the same task, phase and gate
    /// type is already pending, in which case the existing one is returned.
    ///
    /// The boolean is `true` when `candidate` was inserted.
    pub fn insert_or_get(&self, candidate: PendingDecision) -> (PendingDecision, bool) {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.values().find(|p| p.same_gate(&candidate)) {
            return (existing.clone(), false);
        }
        inner.insert(candidate.decision_id.clone(), candidate.clone());
        (candidate, true)
    }

    /// Returns a pending decision by id.
    #[must_use]
    pub fn get(&self, id: &DecisionId) -> Option<PendingDecision> {
        self.inner.lock().get(id).cloned()
    }

    /// Returns all pending decisions, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<PendingDecision> {
        let mut all: Vec<PendingDecision> = self.inner.lock().values().cloned().collect();
        all.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.decision_id.cmp(&b.decision_id))
        });
        all
    }

    /// Removes and returns a decision for resolution.
    #[must_use]
    pub fn claim(&self, id: &DecisionId) -> Option<PendingDecision> {
        self.inner.lock().remove(id)
    }

    /// Puts back a claimed decision whose resolution failed.
    pub fn restore(&self, decision: PendingDecision) {
        self.inner
            .lock()
            .insert(decision.decision_id.clone(), decision);
    }

    /// Drops every pending decision for `task_id`. Returns how many were dropped.
    pub fn discard_for_task(&self, task_id: &TaskId) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|_, p| &p.task_id != task_id);
        before - inner.len()
    }

    /// Drops every pending decision whose task fails `keep`.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&PendingDecision) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|_, p| keep(p));
        before - inner.len()
    }

    /// Number of pending decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no decisions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(task: u64, phase: &str) -> PendingDecision {
        PendingDecision {
            decision_id: DecisionId::generate(),
            task_id: TaskId::from_sequence(task),
            initiative_id: None,
            phase: phase.into(),
            gate_type: GateType::Human,
            question: "Ship it?".into(),
            context: String::new(),
            requested_at: Utc::now(),
        }
    }

    #[test]
    fn insert_is_idempotent_per_gate() {
        let store = PendingDecisionStore::new();
        let (first, inserted) = store.insert_or_get(pending(1, "review"));
        assert!(inserted);
        let (again, inserted) = store.insert_or_get(pending(1, "review"));
        assert!(!inserted);
        assert_eq!(again.decision_id, first.decision_id);
        let (_, inserted) = store.insert_or_get(pending(1, "spec"));
        assert!(inserted);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn claim_removes_exactly_once() {
        let store = PendingDecisionStore::new();
        let (decision, _) = store.insert_or_get(pending(1, "review"));
        assert!(store.claim(&decision.decision_id).is_some());
        assert!(store.claim(&decision.decision_id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn discard_for_task_only_touches_that_task() {
        let store = PendingDecisionStore::new();
        store.insert_or_get(pending(1, "review"));
        store.insert_or_get(pending(1, "spec"));
        store.insert_or_get(pending(2, "review"));
        assert_eq!(store.discard_for_task(&TaskId::from_sequence(1)), 2);
        assert_eq!(store.len(), 1);
    }
}
