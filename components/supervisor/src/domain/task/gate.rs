//! Task domain - Gate types and recorded gate decisions

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ParseEnumError;

/// Kind of checkpoint guarding the end of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateType {
    /// Passes without intervention.
    Auto,
    /// Reviewed by an automated reviewer.
    Ai,
    /// Requires human approval.
    #[default]
    Human,
}

impl GateType {
    /// Parses a gate type from its string representation.
    ///
    /// # Errors
    /// Returns error for unknown gate types.
    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "ai" => Ok(Self::Ai),
            "human" => Ok(Self::Human),
            _ => Err(ParseEnumError::new("gate type", s)),
        }
    }

    /// Returns the storage-compatible string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Ai => "ai",
            Self::Human => "human",
        }
    }
}

impl fmt::Display for GateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved gate, appended to the task's execution record.
///
/// The gate log is append-only; entries are never pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Phase the gate guarded.
    pub phase: String,
    /// Kind of gate.
    pub gate_type: GateType,
    /// Whether the phase was approved.
    pub approved: bool,
    /// Optional explanation from the approver.
    pub reason: Option<String>,
    /// When the decision was recorded.
    pub timestamp: DateTime<Utc>,
}
