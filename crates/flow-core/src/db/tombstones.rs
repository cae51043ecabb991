//! Pending-deletion tombstone store

use std::collections::HashSet;

use libsql::Connection;

use crate::error::Result;
use crate::models::{EntityId, Tombstone};

/// Accessor over the shared `pending_deletions` table.
///
/// A tombstone means "this id was deleted locally and the remote deletion has
/// not been confirmed yet". It is removed only after a successful remote
/// delete, which gives deletion propagation its at-least-once guarantee.
#[derive(Clone)]
pub struct TombstoneStore {
    conn: Connection,
}

impl TombstoneStore {
    /// Create a store over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Insert a tombstone; an existing tombstone for the same id is replaced
    pub async fn insert(&self, tombstone: &Tombstone) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO pending_deletions (id, collection_name) VALUES (?1, ?2)",
                libsql::params![tombstone.id.to_string(), tombstone.collection.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Remove a tombstone after its remote delete has been confirmed
    pub async fn remove(&self, id: EntityId, collection: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM pending_deletions WHERE id = ?1 AND collection_name = ?2",
                libsql::params![id.to_string(), collection],
            )
            .await?;
        Ok(())
    }

    /// Ids of all tombstones for one collection
    pub async fn ids_for_collection(&self, collection: &str) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM pending_deletions WHERE collection_name = ?1",
                libsql::params![collection],
            )
            .await?;

        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            ids.insert(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    /// All tombstones across every collection
    pub async fn list_all(&self) -> Result<Vec<Tombstone>> {
        let mut rows = self
            .conn
            .query("SELECT id, collection_name FROM pending_deletions", ())
            .await?;

        let mut tombstones = Vec::new();
        while let Some(row) = rows.next().await? {
            let raw_id: String = row.get(0)?;
            let id = raw_id.parse().map_err(|_| {
                crate::error::Error::Database(format!("invalid tombstone id: {raw_id}"))
            })?;
            tombstones.push(Tombstone {
                id,
                collection: row.get(1)?,
            });
        }
        Ok(tombstones)
    }
}
