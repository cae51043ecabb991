//! Tombstone model
//!
//! When an item is deleted locally, its id is recorded here. The record keeps
//! the sync pass from re-adding the item from the remote store, and doubles
//! as the retry queue for remote deletions that have not been confirmed yet.

use serde::{Deserialize, Serialize};

use super::EntityId;

/// A pending-deletion marker for one entity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Id of the deleted entity
    pub id: EntityId,
    /// Remote collection the id belongs to (the tombstone table is shared
    /// across entity types)
    pub collection: String,
}

impl Tombstone {
    /// Create a tombstone for an entity in the given collection
    #[must_use]
    pub fn new(id: EntityId, collection: impl Into<String>) -> Self {
        Self {
            id,
            collection: collection.into(),
        }
    }
}
