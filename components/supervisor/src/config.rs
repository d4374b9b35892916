//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::consistency::MissingTaskPolicy;

/// Tunables for the engine, usually embedded in the host's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How `link_tasks` treats ids that do not resolve to a task.
    #[serde(default)]
    pub missing_task_policy: MissingTaskPolicy,
    /// Page size used when a list request gives none (default: 20).
    #[serde(default = "default_page_limit")]
    pub default_page_limit: u32,
    /// Upper bound for a requested page size (default: 100).
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            missing_task_policy: MissingTaskPolicy::default(),
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
        }
    }
}

const fn default_page_limit() -> u32 {
    20
}

const fn default_max_page_limit() -> u32 {
    100
}

impl EngineConfig {
    /// Resolves a requested page size against the configured default and cap.
    #[must_use]
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(limit) if limit > 0 => limit.min(self.max_page_limit),
            _ => self.default_page_limit,
        }
    }
}
