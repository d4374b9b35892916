//! Engine composition root.
//!
//! [`EngineBuilder`] wires the store, publisher, planner and optional batch
//! loader into the managers once. Everything handed out by [`Engine`] shares
//! the same collaborators and the same pending-decision store.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::consistency::{CompletionTracker, LinkRegistry, StatusSource};
use crate::events::{EventPublisher, NoopPublisher};
use crate::gate::{GateWorkflow, PendingDecisionStore};
use crate::initiatives::InitiativeManager;
use crate::planner::{PhasePlanner, WeightPlanner};
use crate::repository::{BatchInitiativeLoader, EntityStore};
use crate::snapshot::SnapshotManager;
use crate::tasks::TaskManager;

/// Builder for [`Engine`].
pub struct EngineBuilder {
    store: Arc<dyn EntityStore>,
    publisher: Arc<dyn EventPublisher>,
    planner: Arc<dyn PhasePlanner>,
    batch_loader: Option<Arc<dyn BatchInitiativeLoader>>,
    pending: Arc<PendingDecisionStore>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Starts a builder over `store`, with a no-op publisher, the weight
    /// planner and scan-based completion.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            publisher: Arc::new(NoopPublisher),
            planner: Arc::new(WeightPlanner::new()),
            batch_loader: None,
            pending: Arc::new(PendingDecisionStore::new()),
            config: EngineConfig::default(),
        }
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Sets the phase planner.
    #[must_use]
    pub fn with_planner(mut self, planner: Arc<dyn PhasePlanner>) -> Self {
        self.planner = planner;
        self
    }

    /// Uses a batched member-status loader for completion checks.
    #[must_use]
    pub fn with_batch_loader(mut self, loader: Arc<dyn BatchInitiativeLoader>) -> Self {
        self.batch_loader = Some(loader);
        self
    }

    /// Shares an existing pending-decision store.
    #[must_use]
    pub fn with_pending_store(mut self, pending: Arc<PendingDecisionStore>) -> Self {
        self.pending = pending;
        self
    }

    /// Sets engine tunables.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> Engine {
        let source = self
            .batch_loader
            .map_or(StatusSource::Scan, StatusSource::Batch);
        let registry = LinkRegistry::new(
            self.store.clone(),
            self.publisher.clone(),
            self.config.missing_task_policy,
        );
        let completion = CompletionTracker::new(self.store.clone(), self.publisher.clone(), source);
        let gates = GateWorkflow::new(self.store.clone(), self.publisher.clone(), self.pending);
        let tasks = TaskManager::new(
            self.store.clone(),
            self.publisher.clone(),
            self.planner,
            registry.clone(),
            gates.clone(),
        );
        let initiatives = InitiativeManager::new(
            self.store.clone(),
            self.publisher,
            registry.clone(),
            completion.clone(),
            self.config,
        );
        let snapshots = SnapshotManager::new(self.store, registry.clone());

        Engine {
            tasks,
            initiatives,
            gates,
            registry,
            completion,
            snapshots,
            config: self.config,
        }
    }
}

/// The assembled orchestration core.
#[derive(Clone)]
pub struct Engine {
    tasks: TaskManager,
    initiatives: InitiativeManager,
    gates: GateWorkflow,
    registry: LinkRegistry,
    completion: CompletionTracker,
    snapshots: SnapshotManager,
    config: EngineConfig,
}

impl Engine {
    /// Starts an [`EngineBuilder`].
    pub fn builder(store: Arc<dyn EntityStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    /// Task operations.
    #[must_use]
    pub const fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Initiative operations.
    #[must_use]
    pub const fn initiatives(&self) -> &InitiativeManager {
        &self.initiatives
    }

    /// Gate decision workflow.
    #[must_use]
    pub const fn gates(&self) -> &GateWorkflow {
        &self.gates
    }

    /// Membership registry, for reconcile passes.
    #[must_use]
    pub const fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    /// Completion tracker.
    #[must_use]
    pub const fn completion(&self) -> &CompletionTracker {
        &self.completion
    }

    /// Snapshot export and import.
    #[must_use]
    pub const fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}
