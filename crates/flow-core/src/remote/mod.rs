//! Remote document store interface
//!
//! The remote store is a hierarchical document database laid out as
//! `users/{userId}/{collection}/{entityId}`. The core only depends on this
//! trait; concrete backends are the HTTP adapter and an in-memory double.

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// A remote document: its id plus the serialized entity fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id, identical to the entity id
    pub id: String,
    /// Entity fields as a JSON object
    pub fields: serde_json::Value,
}

/// What happened to a document in a change batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub doc: Document,
}

/// Collection/document CRUD plus a push-based change stream.
///
/// Implementations must treat `put_document` as an upsert and deliver the
/// current collection contents as an initial `Added` batch when a
/// subscription starts, mirroring snapshot-listener semantics.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upsert a document
    async fn put_document(
        &self,
        user_id: &str,
        collection: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<()>;

    /// Delete a document; deleting a missing document succeeds
    async fn delete_document(&self, user_id: &str, collection: &str, id: &str) -> Result<()>;

    /// Fetch the full collection for a user
    async fn fetch_collection(&self, user_id: &str, collection: &str) -> Result<Vec<Document>>;

    /// Subscribe to changes for a user's collection
    ///
    /// The stream ends when the receiver is dropped or the backend goes away.
    async fn subscribe(
        &self,
        user_id: &str,
        collection: &str,
    ) -> Result<mpsc::Receiver<Vec<DocumentChange>>>;
}
