//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: initial schema
///
/// Entity tables mirror the remote documents plus a local-only `synced` flag
/// (0 = the row has a local change the remote store has not confirmed).
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // inside a transaction for atomicity

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Tasks
        "CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            deadline INTEGER,
            priority INTEGER NOT NULL DEFAULT 1,
            list_name TEXT NOT NULL DEFAULT 'Default',
            completed INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_order ON tasks(completed, priority DESC, deadline)",
        // Notes
        "CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            locked INTEGER NOT NULL DEFAULT 0,
            password_hash TEXT,
            last_modified INTEGER NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE INDEX IF NOT EXISTS idx_notes_user ON notes(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_notes_modified ON notes(last_modified DESC)",
        // Transactions
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            date INTEGER NOT NULL,
            income INTEGER NOT NULL DEFAULT 0,
            category TEXT NOT NULL DEFAULT '',
            receipt_url TEXT,
            last_modified INTEGER NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date DESC)",
        // Pending-deletion tombstones, shared across entity types
        "CREATE TABLE IF NOT EXISTS pending_deletions (
            id TEXT PRIMARY KEY,
            collection_name TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_pending_deletions_collection
            ON pending_deletions(collection_name)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
