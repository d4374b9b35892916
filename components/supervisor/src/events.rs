//! Event Publisher contract.
//!
//! The engine emits an [`Event`] after each successful mutation that other
//! parts of the system care about. Delivery is fire-and-forget: a publisher
//! failure is logged and never rolls back the persisted change.

use core::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Kind of engine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An initiative was created.
    #[serde(rename = "initiative.created")]
    InitiativeCreated,
    /// An initiative's fields, membership or status changed.
    #[serde(rename = "initiative.updated")]
    InitiativeUpdated,
    /// An initiative was deleted.
    #[serde(rename = "initiative.deleted")]
    InitiativeDeleted,
    /// A gate decision was requested.
    #[serde(rename = "decision.requested")]
    DecisionRequested,
    /// A gate decision was resolved.
    #[serde(rename = "decision.resolved")]
    DecisionResolved,
    /// A task changed.
    #[serde(rename = "task.updated")]
    TaskUpdated,
}

impl EventKind {
    /// Returns the dotted wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitiativeCreated => "initiative.created",
            Self::InitiativeUpdated => "initiative.updated",
            Self::InitiativeDeleted => "initiative.deleted",
            Self::DecisionRequested => "decision.requested",
            Self::DecisionResolved => "decision.resolved",
            Self::TaskUpdated => "task.updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published engine event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Id of the entity the event is about.
    pub subject_id: String,
    /// Event-specific body.
    pub payload: serde_json::Value,
    /// When the event was created.
    pub at: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind, subject_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            payload,
            at: Utc::now(),
        }
    }
}

/// Publisher failure.
#[derive(Debug, Error)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

/// Consumer of engine events.
pub trait EventPublisher: Send + Sync {
    /// Hands an event to the transport.
    ///
    /// # Errors
    /// Returns `PublishError` if the transport rejects the event.
    fn publish(&self, event: Event) -> Result<(), PublishError>;
}

/// Publishes and logs any failure instead of propagating it.
pub(crate) fn emit(publisher: &dyn EventPublisher, event: Event) {
    let kind = event.kind;
    let subject = event.subject_id.clone();
    match publisher.publish(event) {
        Ok(()) => debug!(%kind, %subject, "Event published"),
        Err(e) => warn!(%kind, %subject, error = %e, "Event publish failed"),
    }
}

/// Publisher that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: Event) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Publisher that buffers events in memory until drained.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<Event>>,
}

impl MemoryPublisher {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all buffered events.
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Returns the kinds of buffered events, oldest first.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

impl EventPublisher for MemoryPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.events.lock().push(event);
        Ok(())
    }
}
