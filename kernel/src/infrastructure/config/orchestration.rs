//! Orchestration configuration for the Keel kernel.
//!
//! These settings are handed to the engine as an `EngineConfig`, plus the
//! startup recovery switch the host itself acts on.

use serde::Deserialize;
use supervisor::EngineConfig;
use supervisor::consistency::MissingTaskPolicy;

/// Engine and recovery settings.
#[derive(Debug, Deserialize, Clone)]
pub struct OrchestrationSettings {
    /// How `link_tasks` treats unknown task ids (default: skip)
    #[serde(default)]
    pub missing_task_policy: MissingTaskPolicy,

    /// Page size when a list request gives none (default: 20)
    #[serde(default = "default_page_limit")]
    pub default_page_limit: u32,

    /// Largest page size a caller may request (default: 100)
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,

    /// Repair task/initiative membership before serving (default: true)
    #[serde(default = "default_true")]
    pub reconcile_on_startup: bool,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            missing_task_policy: MissingTaskPolicy::default(),
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
            reconcile_on_startup: default_true(),
        }
    }
}

impl OrchestrationSettings {
    /// Engine tunables derived from these settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            missing_task_policy: self.missing_task_policy,
            default_page_limit: self.default_page_limit,
            max_page_limit: self.max_page_limit.max(self.default_page_limit),
        }
    }
}

fn default_page_limit() -> u32 {
    20
}

fn default_max_page_limit() -> u32 {
    100
}

fn default_true() -> bool {
    true
}
