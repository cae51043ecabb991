//! Remote blob storage for transaction receipts
//!
//! Receipts live under `receipts/{userId}/` in the blob store; everything
//! else about the backend is opaque. Uploads return a URL that is stored on
//! the transaction and used for best-effort cleanup on delete.

mod http;

pub use http::HttpBlobStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::EntityId;

/// Blob upload/delete operations shared across storage backends.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a blob under the given key and return its public URL
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Delete a blob previously returned by [`upload`](BlobStore::upload)
    async fn delete_by_url(&self, url: &str) -> Result<()>;
}

/// Build the storage key for a transaction receipt.
///
/// Keys are unique per upload; re-uploading a receipt for the same
/// transaction never overwrites the old object.
#[must_use]
pub fn receipt_key(user_id: &str, transaction_id: EntityId) -> String {
    format!("receipts/{user_id}/{transaction_id}_{}.jpg", Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_key_namespaced_by_user() {
        let id = EntityId::new();
        let key = receipt_key("u1", id);
        assert!(key.starts_with("receipts/u1/"));
        assert!(key.contains(&id.to_string()));
        assert!(key.ends_with(".jpg"));
    }

    #[test]
    fn test_receipt_key_unique_per_upload() {
        let id = EntityId::new();
        assert_ne!(receipt_key("u1", id), receipt_key("u1", id));
    }
}
