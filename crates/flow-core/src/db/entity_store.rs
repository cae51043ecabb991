//! Generic local-cache accessor for synced entities

use std::marker::PhantomData;

use libsql::Connection;

use crate::error::Result;
use crate::models::{EntityId, SyncEntity};

/// Per-entity-type accessor over the local cache.
///
/// Rows are keyed by id with replace-on-conflict semantics (last local write
/// wins locally). Each row carries a `synced` flag the repository uses to
/// track which local changes the remote store has confirmed.
#[derive(Clone)]
pub struct EntityStore<E: SyncEntity> {
    conn: Connection,
    _entity: PhantomData<E>,
}

impl<E: SyncEntity> EntityStore<E> {
    /// Create a store over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    /// Insert or replace an entity row
    ///
    /// `synced` records whether the remote store already holds this exact
    /// state (true for sync/listener pulls, false for local writes).
    pub async fn upsert(&self, entity: &E, synced: bool) -> Result<()> {
        let columns = E::columns().join(", ");
        let placeholders = vec!["?"; E::columns().len() + 1].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({columns}, synced) VALUES ({placeholders})",
            E::TABLE
        );

        let mut values = entity.bind();
        values.push(libsql::Value::Integer(i64::from(synced)));
        self.conn.execute(&sql, values).await?;
        Ok(())
    }

    /// Get a single entity by id
    pub async fn get(&self, id: EntityId) -> Result<Option<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            E::columns().join(", "),
            E::TABLE
        );
        let mut rows = self
            .conn
            .query(&sql, vec![libsql::Value::Text(id.to_string())])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(E::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// List all entities for a user, in the entity's declared ordering
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = ? ORDER BY {}",
            E::columns().join(", "),
            E::TABLE,
            E::order_by()
        );
        let mut rows = self
            .conn
            .query(&sql, vec![libsql::Value::Text(user_id.to_string())])
            .await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(E::from_row(&row)?);
        }
        Ok(entities)
    }

    /// List rows with local changes the remote store has not confirmed
    pub async fn list_unsynced(&self, user_id: &str) -> Result<Vec<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = ? AND synced = 0",
            E::columns().join(", "),
            E::TABLE
        );
        let mut rows = self
            .conn
            .query(&sql, vec![libsql::Value::Text(user_id.to_string())])
            .await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(E::from_row(&row)?);
        }
        Ok(entities)
    }

    /// Mark a row as confirmed by the remote store
    pub async fn mark_synced(&self, id: EntityId) -> Result<()> {
        let sql = format!("UPDATE {} SET synced = 1 WHERE id = ?", E::TABLE);
        self.conn
            .execute(&sql, vec![libsql::Value::Text(id.to_string())])
            .await?;
        Ok(())
    }

    /// Whether the row exists and the remote store has confirmed it
    pub async fn is_synced(&self, id: EntityId) -> Result<Option<bool>> {
        let sql = format!("SELECT synced FROM {} WHERE id = ?", E::TABLE);
        let mut rows = self
            .conn
            .query(&sql, vec![libsql::Value::Text(id.to_string())])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<i64>(0)? != 0)),
            None => Ok(None),
        }
    }

    /// Delete a row by id; deleting a missing row is a no-op
    pub async fn delete(&self, id: EntityId) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
        self.conn
            .execute(&sql, vec![libsql::Value::Text(id.to_string())])
            .await?;
        Ok(())
    }
}
