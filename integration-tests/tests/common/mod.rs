//! Shared test utilities for integration tests.
//!
//! Every property runs against both stores: the in-memory reference store
//! (scan-based completion) and the SQLite store (batched completion).

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use keel_kernel::store::SqliteEntityStore;
use supervisor::consistency::MissingTaskPolicy;
use supervisor::domain::{Initiative, InitiativeId, Task, TaskId, TaskStatus};
use supervisor::events::MemoryPublisher;
use supervisor::initiatives::NewInitiative;
use supervisor::repository::{EntityStore, InMemoryStore, StoreError};
use supervisor::tasks::NewTask;
use supervisor::{Engine, EngineConfig};

/// Storage backend under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `InMemoryStore`, completion by full scan.
    Memory,
    /// `SqliteEntityStore` on `sqlite::memory:`, completion by batch query.
    Sqlite,
}

impl Backend {
    /// Both backends.
    pub const ALL: [Self; 2] = [Self::Memory, Self::Sqlite];
}

/// An engine plus direct handles on its collaborators.
pub struct Harness {
    /// Backend the store belongs to.
    pub backend: Backend,
    /// The store the engine writes to.
    pub store: Arc<dyn EntityStore>,
    /// Captures every published event.
    pub publisher: Arc<MemoryPublisher>,
    /// The engine under test.
    pub engine: Engine,
}

impl Harness {
    /// Builds a harness with the default configuration.
    pub async fn new(backend: Backend) -> Result<Self> {
        Self::with_config(backend, EngineConfig::default()).await
    }

    /// Builds a harness with `policy` for missing task ids.
    pub async fn with_policy(backend: Backend, policy: MissingTaskPolicy) -> Result<Self> {
        Self::with_config(
            backend,
            EngineConfig {
                missing_task_policy: policy,
                ..EngineConfig::default()
            },
        )
        .await
    }

    /// Builds a harness with an explicit configuration.
    pub async fn with_config(backend: Backend, config: EngineConfig) -> Result<Self> {
        let publisher = Arc::new(MemoryPublisher::new());
        let (store, engine) = match backend {
            Backend::Memory => {
                let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new());
                let engine = Engine::builder(store.clone())
                    .with_publisher(publisher.clone())
                    .with_config(config)
                    .build();
                (store, engine)
            }
            Backend::Sqlite => {
                let sqlite = Arc::new(SqliteEntityStore::connect("sqlite::memory:", 1).await?);
                let engine = Engine::builder(sqlite.clone())
                    .with_batch_loader(sqlite.clone())
                    .with_publisher(publisher.clone())
                    .with_config(config)
                    .build();
                let store: Arc<dyn EntityStore> = sqlite;
                (store, engine)
            }
        };
        Ok(Self {
            backend,
            store,
            publisher,
            engine,
        })
    }

    /// Creates a task with only a title.
    pub async fn task(&self, title: &str) -> Result<TaskId> {
        self.task_blocked_by(title, Vec::new()).await
    }

    /// Creates a task with initial blockers.
    pub async fn task_blocked_by(&self, title: &str, blocked_by: Vec<TaskId>) -> Result<TaskId> {
        let view = self
            .engine
            .tasks()
            .create_task(NewTask {
                title: title.into(),
                blocked_by,
                ..NewTask::default()
            })
            .await?;
        Ok(view.task.id)
    }

    /// Creates an initiative, optionally on a merge-flow branch.
    pub async fn initiative(&self, title: &str, branch_base: Option<&str>) -> Result<InitiativeId> {
        let view = self
            .engine
            .initiatives()
            .create_initiative(NewInitiative {
                title: title.into(),
                branch_base: branch_base.map(str::to_string),
                ..NewInitiative::default()
            })
            .await?;
        Ok(view.initiative.id)
    }

    /// Drives a task through the lifecycle to `completed`.
    pub async fn complete(&self, id: &TaskId) -> Result<()> {
        let tasks = self.engine.tasks();
        tasks.plan_task(id).await?;
        tasks.run_task(id).await?;
        tasks
            .report_outcome(id, supervisor::tasks::TaskOutcome::Completed)
            .await?;
        Ok(())
    }

    /// Plans and runs a task.
    pub async fn start(&self, id: &TaskId) -> Result<()> {
        self.engine.tasks().plan_task(id).await?;
        self.engine.tasks().run_task(id).await?;
        Ok(())
    }

    /// Reads a task straight from the store.
    pub async fn stored_task(&self, id: &TaskId) -> Result<Task> {
        self.store
            .load_task(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("{id} missing from store"))
    }

    /// Reads an initiative straight from the store.
    pub async fn stored_initiative(&self, id: &InitiativeId) -> Result<Initiative> {
        self.store
            .load_initiative(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("{id} missing from store"))
    }

    /// Ids in the initiative's resolved junction list.
    pub async fn member_ids(&self, id: &InitiativeId) -> Result<Vec<TaskId>> {
        Ok(self
            .stored_initiative(id)
            .await?
            .tasks
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    /// Current status of a stored task.
    pub async fn status(&self, id: &TaskId) -> Result<TaskStatus> {
        Ok(self.stored_task(id).await?.status)
    }
}

/// Store wrapper whose writes can be switched to fail.
///
/// Reads always pass through, so the engine sees consistent data up to the
/// point the failure is armed.
pub struct FlakyStore {
    inner: Arc<dyn EntityStore>,
    fail_junction_writes: AtomicBool,
    fail_junction_removals: AtomicBool,
    fail_task_writes: AtomicBool,
    failing_initiative: Mutex<Option<InitiativeId>>,
}

impl FlakyStore {
    /// Wraps `inner` with no failures armed.
    pub fn new(inner: Arc<dyn EntityStore>) -> Self {
        Self {
            inner,
            fail_junction_writes: AtomicBool::new(false),
            fail_junction_removals: AtomicBool::new(false),
            fail_task_writes: AtomicBool::new(false),
            failing_initiative: Mutex::new(None),
        }
    }

    /// Makes junction inserts and removals fail.
    pub fn fail_junction_writes(&self, fail: bool) {
        self.fail_junction_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes only junction removals fail; inserts still go through.
    pub fn fail_junction_removals(&self, fail: bool) {
        self.fail_junction_removals.store(fail, Ordering::SeqCst);
    }

    /// Makes task saves fail.
    pub fn fail_task_writes(&self, fail: bool) {
        self.fail_task_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes saves of one initiative fail; `None` disarms it.
    pub fn fail_initiative_writes(&self, id: Option<InitiativeId>) {
        *self.failing_initiative.lock() = id;
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Backend("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.load_task(id).await
    }

    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        Self::check(&self.fail_task_writes)?;
        self.inner.save_task(task).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        self.inner.delete_task(id).await
    }

    async fn load_all_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.inner.load_all_tasks().await
    }

    async fn load_initiative(&self, id: &InitiativeId) -> Result<Option<Initiative>, StoreError> {
        self.inner.load_initiative(id).await
    }

    async fn save_initiative(&self, initiative: &Initiative) -> Result<(), StoreError> {
        if self.failing_initiative.lock().as_ref() == Some(&initiative.id) {
            return Err(StoreError::Backend("injected failure".into()));
        }
        self.inner.save_initiative(initiative).await
    }

    async fn delete_initiative(&self, id: &InitiativeId) -> Result<(), StoreError> {
        self.inner.delete_initiative(id).await
    }

    async fn load_all_initiatives(&self) -> Result<Vec<Initiative>, StoreError> {
        self.inner.load_all_initiatives().await
    }

    async fn add_task_to_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
        sequence: u32,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_junction_writes)?;
        self.inner
            .add_task_to_initiative(initiative_id, task_id, sequence)
            .await
    }

    async fn remove_task_from_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_junction_writes)?;
        Self::check(&self.fail_junction_removals)?;
        self.inner
            .remove_task_from_initiative(initiative_id, task_id)
            .await
    }

    async fn get_initiative_tasks(
        &self,
        initiative_id: &InitiativeId,
    ) -> Result<Vec<TaskId>, StoreError> {
        self.inner.get_initiative_tasks(initiative_id).await
    }

    async fn next_junction_sequence(&self, initiative_id: &InitiativeId) -> Result<u32, StoreError> {
        self.inner.next_junction_sequence(initiative_id).await
    }

    async fn next_task_id(&self) -> Result<TaskId, StoreError> {
        self.inner.next_task_id().await
    }

    async fn next_initiative_id(&self) -> Result<InitiativeId, StoreError> {
        self.inner.next_initiative_id().await
    }
}
