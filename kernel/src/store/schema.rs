//! SQLite schema for tasks, initiatives and the membership junction.

use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        seq INTEGER,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL,
        weight TEXT NOT NULL,
        blocked_by TEXT NOT NULL DEFAULT '[]',
        related_to TEXT NOT NULL DEFAULT '[]',
        initiative_id TEXT,
        phases TEXT NOT NULL DEFAULT '[]',
        current_phase TEXT,
        pending_gate TEXT,
        gates TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_initiative ON tasks (initiative_id)",
    "CREATE TABLE IF NOT EXISTS initiatives (
        id TEXT PRIMARY KEY,
        seq INTEGER,
        title TEXT NOT NULL,
        vision TEXT,
        status TEXT NOT NULL,
        owner TEXT,
        branch_base TEXT,
        blocked_by TEXT NOT NULL DEFAULT '[]',
        decisions TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS initiative_tasks (
        initiative_id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        PRIMARY KEY (initiative_id, task_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_initiative_tasks_task ON initiative_tasks (task_id)",
    "CREATE TABLE IF NOT EXISTS id_sequences (
        kind TEXT PRIMARY KEY,
        last INTEGER NOT NULL
    )",
];

/// Creates any missing tables and indexes. Safe to run on every start.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = STATEMENTS.len(), "Schema up to date");
    Ok(())
}
