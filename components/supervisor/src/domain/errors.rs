//! Domain errors - Error types for validation and parsing failures
//!
//! This module defines error types used throughout the domain layer
//! for validation failures and parsing errors.

use core::fmt;

/// Error type for domain validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifiers cannot be empty.
    EmptyId,
    /// Titles cannot be empty.
    EmptyTitle,
    /// Initiative identifiers must look like `INIT-<alphanumerics>`.
    MalformedInitiativeId(String),
    /// Decision text cannot be empty.
    EmptyDecision,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => write!(f, "id cannot be empty"),
            Self::EmptyTitle => write!(f, "title is required"),
            Self::MalformedInitiativeId(id) => write!(
                f,
                "invalid initiative id '{id}': must start with INIT- followed by alphanumerics"
            ),
            Self::EmptyDecision => write!(f, "decision text is required"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Error when parsing an unknown enum string (status, weight, gate type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}
