//! Host wiring for the Keel kernel.
//!
//! `KeelHost` owns the SQLite store, the event broadcaster and the assembled
//! engine. Startup recovery repairs membership drift and rebuilds pending gate
//! decisions before anything is served.

use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::SqlitePool;
use supervisor::consistency::ReconcileReport;
use supervisor::Engine;
use tracing::{info, instrument};

use crate::events::BroadcastPublisher;
use crate::infrastructure::audit::{log_audit, AuditEvent};
use crate::infrastructure::config::{DatabaseSettings, OrchestrationSettings};
use crate::store::SqliteEntityStore;

/// Counter of membership repairs made by startup reconcile passes.
pub const RECONCILE_REPAIRS_METRIC: &str = "keel_reconcile_repairs_total";

/// Counter of pending decisions restored at startup.
pub const DECISIONS_RECOVERED_METRIC: &str = "keel_decisions_recovered_total";

/// What startup recovery did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Result of the reconcile pass, if one ran.
    pub reconcile: Option<ReconcileReport>,
    /// Pending decisions rebuilt from blocked tasks.
    pub decisions_restored: usize,
}

struct KeelHostInner {
    store: Arc<SqliteEntityStore>,
    publisher: BroadcastPublisher,
    engine: Engine,
    orchestration: OrchestrationSettings,
}

/// The running kernel: store, broadcaster and engine.
///
/// Cheap to clone; every clone shares the same engine.
#[derive(Clone)]
pub struct KeelHost {
    inner: Arc<KeelHostInner>,
}

impl KeelHost {
    /// Connects the database, applies the schema and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(
        database: &DatabaseSettings,
        orchestration: &OrchestrationSettings,
    ) -> Result<Self> {
        let store = SqliteEntityStore::connect(
            database.url.expose_secret(),
            database.max_connections,
        )
        .await
        .context("Failed to open entity store")?;
        Ok(Self::with_store(store, orchestration.clone()))
    }

    /// Builds the host over an already-migrated store.
    #[must_use]
    pub fn with_store(store: SqliteEntityStore, orchestration: OrchestrationSettings) -> Self {
        let store = Arc::new(store);
        let publisher = BroadcastPublisher::new();
        let engine = Engine::builder(store.clone())
            .with_batch_loader(store.clone())
            .with_publisher(Arc::new(publisher.clone()))
            .with_config(orchestration.engine_config())
            .build();

        Self {
            inner: Arc::new(KeelHostInner {
                store,
                publisher,
                engine,
                orchestration,
            }),
        }
    }

    /// Runs startup recovery.
    ///
    /// Reconciles membership when `reconcile_on_startup` is set, then rebuilds
    /// the pending-decision set. Each step is written to the audit log.
    ///
    /// # Errors
    ///
    /// Returns an error if either pass fails to read or write the store.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Recovery> {
        let engine = &self.inner.engine;
        let mut recovery = Recovery::default();

        if self.inner.orchestration.reconcile_on_startup {
            let report = engine
                .registry()
                .reconcile()
                .await
                .context("Membership reconcile failed")?;
            metrics::counter!(RECONCILE_REPAIRS_METRIC).increment(report.total() as u64);
            if report.is_clean() {
                info!("Membership consistent");
            } else {
                info!(repairs = report.total(), "Membership repaired");
            }
            log_audit(&AuditEvent::ReconcileCompleted {
                report: report.clone(),
            });
            recovery.reconcile = Some(report);
        }

        let restored = engine
            .gates()
            .rebuild()
            .await
            .context("Pending decision rebuild failed")?;
        metrics::counter!(DECISIONS_RECOVERED_METRIC).increment(restored as u64);
        log_audit(&AuditEvent::DecisionsRecovered { restored });
        recovery.decisions_restored = restored;

        Ok(recovery)
    }

    /// The assembled engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// The event broadcaster; subscribe here for engine events.
    #[must_use]
    pub fn publisher(&self) -> &BroadcastPublisher {
        &self.inner.publisher
    }

    /// The SQLite pool, for health probes.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        self.inner.store.pool()
    }
}
