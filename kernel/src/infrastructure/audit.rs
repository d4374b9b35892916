//! Audit trail for host lifecycle and recovery events.

use serde::Serialize;
use supervisor::consistency::ReconcileReport;
use tracing::{info, info_span};

/// Domain event for audit logging.
/// Structured for JSON serialization to enable machine-readable audit trails.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The host process started.
    SystemStartup {
        /// Component that started.
        component: String,
    },
    /// The host process is shutting down.
    SystemShutdown {
        /// Why.
        reason: String,
    },
    /// A membership reconcile pass finished.
    ReconcileCompleted {
        /// Repairs made.
        report: ReconcileReport,
    },
    /// Pending gate decisions were rebuilt from blocked tasks.
    DecisionsRecovered {
        /// Requests restored.
        restored: usize,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// This uses a specific `target` which can be filtered by the subscriber to redirect to a secure file.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Audit event");
}
