//! SQLite implementation of the engine's `EntityStore`.
//!
//! List-valued fields are stored as JSON text columns. Membership lives in
//! `initiative_tasks`, written only through the junction methods, so the
//! task row and the junction row are two independent writes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{
    sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow},
    QueryBuilder, Row, Sqlite,
};
use supervisor::domain::{
    GateType, Initiative, InitiativeId, InitiativeStatus, Task, TaskId, TaskRef, TaskStatus,
    Weight,
};
use supervisor::repository::{BatchInitiativeLoader, EntityStore, StoreError};
use tracing::{debug, instrument};

/// Errors raised inside the SQLite store before they cross into the engine.
#[derive(Debug, thiserror::Error)]
pub enum SqlStoreError {
    /// Database-related error.
    #[error("Database Error: {0}")]
    DbError(#[from] sqlx::Error),
    /// A row could not be decoded into a domain value.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Row id.
        id: String,
        /// What failed to decode.
        reason: String,
    },
}

impl From<SqlStoreError> for StoreError {
    fn from(err: SqlStoreError) -> Self {
        match err {
            SqlStoreError::DbError(e) => StoreError::Backend(e.to_string()),
            SqlStoreError::Corrupt { id, reason } => StoreError::Corrupt { id, reason },
        }
    }
}

const TASK_COLUMNS: &str = "id, title, description, status, weight, blocked_by, related_to, \
    initiative_id, phases, current_phase, pending_gate, gates, created_at, updated_at";

const INITIATIVE_COLUMNS: &str = "id, title, vision, status, owner, branch_base, blocked_by, \
    decisions, created_at, updated_at";

const NEXT_TASK_ID: &str = "INSERT INTO id_sequences (kind, last) \
    VALUES ('task', COALESCE((SELECT MAX(seq) FROM tasks), 0) + 1) \
    ON CONFLICT (kind) DO UPDATE SET last = MAX(last, COALESCE((SELECT MAX(seq) FROM tasks), 0)) + 1 \
    RETURNING last";

const NEXT_INITIATIVE_ID: &str = "INSERT INTO id_sequences (kind, last) \
    VALUES ('initiative', COALESCE((SELECT MAX(seq) FROM initiatives), 0) + 1) \
    ON CONFLICT (kind) DO UPDATE SET last = MAX(last, COALESCE((SELECT MAX(seq) FROM initiatives), 0)) + 1 \
    RETURNING last";

/// Entity store over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
}

impl SqliteEntityStore {
    /// Wraps an existing pool. The schema must already exist.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `url` and creates any missing tables.
    ///
    /// An in-memory database is private to its connection, so such URLs get a
    /// single connection that is never recycled.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the schema migration fails.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, SqlStoreError> {
        let options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = options.connect(url).await?;
        super::schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_task(&self, id: &TaskId) -> Result<Option<Task>, SqlStoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| task_from_row(&row))
            .transpose()
    }

    async fn fetch_all_tasks(&self) -> Result<Vec<Task>, SqlStoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id");
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(task_from_row)
            .collect()
    }

    async fn write_task(&self, task: &Task) -> Result<(), SqlStoreError> {
        sqlx::query(
            "INSERT INTO tasks (id, seq, title, description, status, weight, blocked_by, related_to, \
             initiative_id, phases, current_phase, pending_gate, gates, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             title = excluded.title, description = excluded.description, status = excluded.status, \
             weight = excluded.weight, blocked_by = excluded.blocked_by, related_to = excluded.related_to, \
             initiative_id = excluded.initiative_id, phases = excluded.phases, \
             current_phase = excluded.current_phase, pending_gate = excluded.pending_gate, \
             gates = excluded.gates, updated_at = excluded.updated_at",
        )
        .bind(task.id.as_str())
        .bind(task.id.sequence().and_then(|s| i64::try_from(s).ok()))
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.status.as_str())
        .bind(task.weight.as_str())
        .bind(to_json(&task.id, &task.blocked_by)?)
        .bind(to_json(&task.id, &task.related_to)?)
        .bind(task.initiative_id.as_ref().map(InitiativeId::as_str))
        .bind(to_json(&task.id, &task.phases)?)
        .bind(task.current_phase.as_deref())
        .bind(task.pending_gate.map(GateType::as_str))
        .bind(to_json(&task.id, &task.gates)?)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_initiatives(
        &self,
        id: Option<&InitiativeId>,
    ) -> Result<Vec<Initiative>, SqlStoreError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {INITIATIVE_COLUMNS} FROM initiatives"));
        if let Some(id) = id {
            query.push(" WHERE id = ").push_bind(id.as_str());
        }
        query.push(" ORDER BY id");
        let mut initiatives = query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(initiative_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let mut members = self.fetch_members(id).await?;
        for initiative in &mut initiatives {
            initiative.tasks = members.remove(&initiative.id).unwrap_or_default();
        }
        Ok(initiatives)
    }

    /// Junction entries resolved against `tasks`; dangling entries drop out of the join.
    async fn fetch_members(
        &self,
        id: Option<&InitiativeId>,
    ) -> Result<HashMap<InitiativeId, Vec<TaskRef>>, SqlStoreError> {
        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT it.initiative_id, t.id, t.title, t.status FROM initiative_tasks it \
             JOIN tasks t ON t.id = it.task_id",
        );
        if let Some(id) = id {
            query.push(" WHERE it.initiative_id = ").push_bind(id.as_str());
        }
        query.push(" ORDER BY it.initiative_id, it.sequence, it.rowid");

        let mut members: HashMap<InitiativeId, Vec<TaskRef>> = HashMap::new();
        for row in query.build().fetch_all(&self.pool).await? {
            let initiative_id = initiative_id_column(&row, 0)?;
            let task_id: String = row.try_get(1)?;
            let status: String = row.try_get(3)?;
            let task_ref = TaskRef {
                id: TaskId::new(task_id.clone()).map_err(|e| corrupt(&task_id, e))?,
                title: row.try_get(2)?,
                status: TaskStatus::parse(&status).map_err(|e| corrupt(&task_id, e))?,
            };
            members.entry(initiative_id).or_default().push(task_ref);
        }
        Ok(members)
    }

    async fn write_initiative(&self, initiative: &Initiative) -> Result<(), SqlStoreError> {
        let key = initiative.id.as_str();
        sqlx::query(
            "INSERT INTO initiatives (id, seq, title, vision, status, owner, branch_base, \
             blocked_by, decisions, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             title = excluded.title, vision = excluded.vision, status = excluded.status, \
             owner = excluded.owner, branch_base = excluded.branch_base, \
             blocked_by = excluded.blocked_by, decisions = excluded.decisions, \
             updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(initiative.id.sequence().and_then(|s| i64::try_from(s).ok()))
        .bind(&initiative.title)
        .bind(initiative.vision.as_deref())
        .bind(initiative.status.as_str())
        .bind(initiative.owner.as_deref())
        .bind(initiative.branch_base.as_deref())
        .bind(to_json(key, &initiative.blocked_by)?)
        .bind(to_json(key, &initiative.decisions)?)
        .bind(initiative.created_at.to_rfc3339())
        .bind(initiative.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn allocate(&self, sql: &str) -> Result<u64, SqlStoreError> {
        let last: i64 = sqlx::query(sql).fetch_one(&self.pool).await?.try_get(0)?;
        u64::try_from(last).map_err(|e| corrupt("id_sequences", e))
    }
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.fetch_task(id).await?)
    }

    #[instrument(skip(self, task), fields(task = %task.id))]
    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        Ok(self.write_task(task).await?)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(SqlStoreError::from)?;
        Ok(())
    }

    async fn load_all_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.fetch_all_tasks().await?)
    }

    async fn load_initiative(&self, id: &InitiativeId) -> Result<Option<Initiative>, StoreError> {
        Ok(self.fetch_initiatives(Some(id)).await?.pop())
    }

    #[instrument(skip(self, initiative), fields(initiative = %initiative.id))]
    async fn save_initiative(&self, initiative: &Initiative) -> Result<(), StoreError> {
        Ok(self.write_initiative(initiative).await?)
    }

    async fn delete_initiative(&self, id: &InitiativeId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(SqlStoreError::from)?;
        sqlx::query("DELETE FROM initiative_tasks WHERE initiative_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(SqlStoreError::from)?;
        sqlx::query("DELETE FROM initiatives WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(SqlStoreError::from)?;
        tx.commit().await.map_err(SqlStoreError::from)?;
        Ok(())
    }

    async fn load_all_initiatives(&self) -> Result<Vec<Initiative>, StoreError> {
        Ok(self.fetch_initiatives(None).await?)
    }

    #[instrument(skip(self), fields(initiative = %initiative_id, task = %task_id))]
    async fn add_task_to_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
        sequence: u32,
    ) -> Result<(), StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO initiative_tasks (initiative_id, task_id, sequence) VALUES (?, ?, ?) \
             ON CONFLICT (initiative_id, task_id) DO NOTHING",
        )
        .bind(initiative_id.as_str())
        .bind(task_id.as_str())
        .bind(i64::from(sequence))
        .execute(&self.pool)
        .await
        .map_err(SqlStoreError::from)?
        .rows_affected();
        debug!(inserted, "Junction upsert");
        Ok(())
    }

    async fn remove_task_from_initiative(
        &self,
        initiative_id: &InitiativeId,
        task_id: &TaskId,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM initiative_tasks WHERE initiative_id = ? AND task_id = ?")
            .bind(initiative_id.as_str())
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(SqlStoreError::from)?;
        Ok(())
    }

    async fn get_initiative_tasks(
        &self,
        initiative_id: &InitiativeId,
    ) -> Result<Vec<TaskId>, StoreError> {
        let rows = sqlx::query(
            "SELECT task_id FROM initiative_tasks WHERE initiative_id = ? ORDER BY sequence, rowid",
        )
        .bind(initiative_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(SqlStoreError::from)?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get(0).map_err(SqlStoreError::from)?;
            ids.push(TaskId::new(raw.clone()).map_err(|e| corrupt(&raw, e))?);
        }
        Ok(ids)
    }

    async fn next_junction_sequence(&self, initiative_id: &InitiativeId) -> Result<u32, StoreError> {
        let next: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence) + 1, 0) FROM initiative_tasks WHERE initiative_id = ?",
        )
        .bind(initiative_id.as_str())
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get(0))
        .map_err(SqlStoreError::from)?;
        u32::try_from(next).map_err(|_| {
            StoreError::Backend(format!("junction sequence exhausted for {initiative_id}"))
        })
    }

    async fn next_task_id(&self) -> Result<TaskId, StoreError> {
        Ok(TaskId::from_sequence(self.allocate(NEXT_TASK_ID).await?))
    }

    async fn next_initiative_id(&self) -> Result<InitiativeId, StoreError> {
        Ok(InitiativeId::from_sequence(
            self.allocate(NEXT_INITIATIVE_ID).await?,
        ))
    }
}

#[async_trait]
impl BatchInitiativeLoader for SqliteEntityStore {
    #[instrument(skip(self, initiative_ids), fields(count = initiative_ids.len()))]
    async fn load_member_statuses(
        &self,
        initiative_ids: &[InitiativeId],
    ) -> Result<HashMap<InitiativeId, Vec<TaskStatus>>, StoreError> {
        let mut statuses: HashMap<InitiativeId, Vec<TaskStatus>> = initiative_ids
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        if initiative_ids.is_empty() {
            return Ok(statuses);
        }

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT it.initiative_id, t.status FROM initiative_tasks it \
             JOIN tasks t ON t.id = it.task_id WHERE it.initiative_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in initiative_ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(SqlStoreError::from)?;
        for row in rows {
            let initiative_id = initiative_id_column(&row, 0)?;
            let raw: String = row.try_get(1).map_err(SqlStoreError::from)?;
            let status = TaskStatus::parse(&raw).map_err(|e| corrupt(initiative_id.as_str(), e))?;
            statuses.entry(initiative_id).or_default().push(status);
        }
        Ok(statuses)
    }
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> SqlStoreError {
    SqlStoreError::Corrupt {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn to_json(id: impl std::fmt::Display, value: &impl serde::Serialize) -> Result<String, SqlStoreError> {
    serde_json::to_string(value).map_err(|e| corrupt(&id.to_string(), e))
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str, id: &str) -> Result<T, SqlStoreError> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| corrupt(id, format!("{column}: {e}")))
}

fn timestamp_column(row: &SqliteRow, column: &str, id: &str) -> Result<DateTime<Utc>, SqlStoreError> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(id, format!("{column}: {e}")))
}

fn initiative_id_column(row: &SqliteRow, index: usize) -> Result<InitiativeId, SqlStoreError> {
    let raw: String = row.try_get(index)?;
    InitiativeId::new(raw.clone()).map_err(|e| corrupt(&raw, e))
}

fn task_from_row(row: &SqliteRow) -> Result<Task, SqlStoreError> {
    let raw_id: String = row.try_get("id")?;
    let id = raw_id.as_str();
    let status: String = row.try_get("status")?;
    let weight: String = row.try_get("weight")?;
    let pending_gate: Option<String> = row.try_get("pending_gate")?;
    let initiative_id: Option<String> = row.try_get("initiative_id")?;

    Ok(Task {
        id: TaskId::new(id).map_err(|e| corrupt(id, e))?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: TaskStatus::parse(&status).map_err(|e| corrupt(id, e))?,
        weight: Weight::parse(&weight).map_err(|e| corrupt(id, e))?,
        blocked_by: json_column(row, "blocked_by", id)?,
        related_to: json_column(row, "related_to", id)?,
        initiative_id: initiative_id
            .map(InitiativeId::new)
            .transpose()
            .map_err(|e| corrupt(id, e))?,
        phases: json_column(row, "phases", id)?,
        current_phase: row.try_get("current_phase")?,
        pending_gate: pending_gate
            .as_deref()
            .map(GateType::parse)
            .transpose()
            .map_err(|e| corrupt(id, e))?,
        gates: json_column(row, "gates", id)?,
        created_at: timestamp_column(row, "created_at", id)?,
        updated_at: timestamp_column(row, "updated_at", id)?,
    })
}

fn initiative_from_row(row: &SqliteRow) -> Result<Initiative, SqlStoreError> {
    let raw_id: String = row.try_get("id")?;
    let id = raw_id.as_str();
    let status: String = row.try_get("status")?;

    Ok(Initiative {
        id: InitiativeId::new(id).map_err(|e| corrupt(id, e))?,
        title: row.try_get("title")?,
        vision: row.try_get("vision")?,
        status: InitiativeStatus::parse(&status).map_err(|e| corrupt(id, e))?,
        owner: row.try_get("owner")?,
        branch_base: row.try_get("branch_base")?,
        blocked_by: json_column(row, "blocked_by", id)?,
        tasks: Vec::new(),
        decisions: json_column(row, "decisions", id)?,
        created_at: timestamp_column(row, "created_at", id)?,
        updated_at: timestamp_column(row, "updated_at", id)?,
    })
}
