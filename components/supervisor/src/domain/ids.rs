//! Domain identifiers - Newtype wrappers for type safety
//!
//! Task, initiative and decision identifiers are all strings on the wire,
//! so they are wrapped to keep them from being mixed up at compile time.

use core::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ValidationError;

const TASK_PREFIX: &str = "TASK-";
const INITIATIVE_PREFIX: &str = "INIT-";

static INITIATIVE_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^INIT-[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").ok());

/// Parses the numeric suffix of a prefixed sequential id such as `TASK-007`.
fn sequence_of(id: &str, prefix: &str) -> Option<u64> {
    id.strip_prefix(prefix)?.parse().ok()
}

/// Unique identifier for a task, e.g. `TASK-001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a `TaskId` from an existing string.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyId` if the id is blank.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        Ok(Self(id))
    }

    /// Formats the id allocated for the given sequence number (`TASK-001`).
    #[must_use]
    pub fn from_sequence(sequence: u64) -> Self {
        Self(format!("{TASK_PREFIX}{sequence:03}"))
    }

    /// Returns the sequence number if this id was allocated by [`Self::from_sequence`].
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        sequence_of(&self.0, TASK_PREFIX)
    }

    /// Returns the inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an initiative, e.g. `INIT-001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InitiativeId(String);

impl InitiativeId {
    /// Creates an `InitiativeId` from a stored string.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyId` if the id is blank.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        Ok(Self(id))
    }

    /// Creates an `InitiativeId` from caller input, enforcing the `INIT-` format.
    ///
    /// # Errors
    /// Returns `ValidationError::MalformedInitiativeId` if the id does not match.
    pub fn parse(id: &str) -> Result<Self, ValidationError> {
        let matches = INITIATIVE_ID_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(id));
        if !matches {
            return Err(ValidationError::MalformedInitiativeId(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    /// Formats the id allocated for the given sequence number (`INIT-001`).
    #[must_use]
    pub fn from_sequence(sequence: u64) -> Self {
        Self(format!("{INITIATIVE_PREFIX}{sequence:03}"))
    }

    /// Returns the sequence number if this id was allocated by [`Self::from_sequence`].
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        sequence_of(&self.0, INITIATIVE_PREFIX)
    }

    /// Returns the inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InitiativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a pending gate decision, e.g. `GATE-4f0c...`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(String);

impl DecisionId {
    /// Generates a fresh random decision id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("GATE-{}", uuid::Uuid::new_v4()))
    }

    /// Wraps an existing decision id string.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyId` if the id is blank.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        Ok(Self(id))
    }

    /// Returns the inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
