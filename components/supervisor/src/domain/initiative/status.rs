//! Initiative domain - Lifecycle status

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::ParseEnumError;

/// Initiative lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitiativeStatus {
    /// Being shaped; not yet worked on.
    Draft,
    /// Tasks are being worked on.
    #[default]
    Active,
    /// All work finished.
    Completed,
}

impl InitiativeStatus {
    /// Parses status from its string representation.
    ///
    /// # Errors
    /// Returns error for unknown status strings.
    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseEnumError::new("initiative status", s)),
        }
    }

    /// Returns the storage-compatible string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for InitiativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
