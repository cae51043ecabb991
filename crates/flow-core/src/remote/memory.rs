//! In-memory remote store
//!
//! A process-local backend with the same contract as the HTTP adapter. Used
//! by tests (it can inject failures) and by demos that run without a server.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChangeKind, Document, DocumentChange, RemoteStore};
use crate::error::{Error, Result};

const CHANGE_CHANNEL_CAPACITY: usize = 32;

type CollectionKey = (String, String);

#[derive(Default)]
struct Inner {
    collections: HashMap<CollectionKey, BTreeMap<String, serde_json::Value>>,
    subscribers: HashMap<CollectionKey, Vec<mpsc::Sender<Vec<DocumentChange>>>>,
    denied_deletes: HashSet<String>,
    offline: bool,
}

/// In-memory [`RemoteStore`] with subscriber fan-out and failure injection.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every remote operation fail, as if the network were down
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make deletes of the given document id fail until cleared
    pub fn deny_delete(&self, id: &str) {
        self.lock().denied_deletes.insert(id.to_string());
    }

    /// Clear all injected delete failures
    pub fn allow_all_deletes(&self) {
        self.lock().denied_deletes.clear();
    }

    /// Look up a stored document (test inspection)
    #[must_use]
    pub fn document(&self, user_id: &str, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.lock()
            .collections
            .get(&key(user_id, collection))
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in a collection (test inspection)
    #[must_use]
    pub fn collection_len(&self, user_id: &str, collection: &str) -> usize {
        self.lock()
            .collections
            .get(&key(user_id, collection))
            .map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn notify(&self, collection_key: &CollectionKey, batch: Vec<DocumentChange>) {
        let senders: Vec<_> = self
            .lock()
            .subscribers
            .get(collection_key)
            .map(|subs| subs.to_vec())
            .unwrap_or_default();

        let mut dead = Vec::new();
        for (index, sender) in senders.iter().enumerate() {
            if sender.send(batch.clone()).await.is_err() {
                dead.push(index);
            }
        }

        if !dead.is_empty() {
            let mut inner = self.lock();
            if let Some(subs) = inner.subscribers.get_mut(collection_key) {
                subs.retain(|sender| !sender.is_closed());
            }
        }
    }
}

fn key(user_id: &str, collection: &str) -> CollectionKey {
    (user_id.to_string(), collection.to_string())
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn put_document(
        &self,
        user_id: &str,
        collection: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<()> {
        let collection_key = key(user_id, collection);
        let change = {
            let mut inner = self.lock();
            if inner.offline {
                return Err(Error::Remote("remote store is unreachable".to_string()));
            }

            let docs = inner.collections.entry(collection_key.clone()).or_default();
            let kind = if docs.contains_key(id) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            docs.insert(id.to_string(), fields.clone());
            DocumentChange {
                kind,
                doc: Document {
                    id: id.to_string(),
                    fields,
                },
            }
        };

        self.notify(&collection_key, vec![change]).await;
        Ok(())
    }

    async fn delete_document(&self, user_id: &str, collection: &str, id: &str) -> Result<()> {
        let collection_key = key(user_id, collection);
        let removed = {
            let mut inner = self.lock();
            if inner.offline {
                return Err(Error::Remote("remote store is unreachable".to_string()));
            }
            if inner.denied_deletes.contains(id) {
                return Err(Error::Remote(format!("delete of {id} denied")));
            }

            inner
                .collections
                .get_mut(&collection_key)
                .and_then(|docs| docs.remove(id))
        };

        if let Some(fields) = removed {
            let change = DocumentChange {
                kind: ChangeKind::Removed,
                doc: Document {
                    id: id.to_string(),
                    fields,
                },
            };
            self.notify(&collection_key, vec![change]).await;
        }
        Ok(())
    }

    async fn fetch_collection(&self, user_id: &str, collection: &str) -> Result<Vec<Document>> {
        let inner = self.lock();
        if inner.offline {
            return Err(Error::Remote("remote store is unreachable".to_string()));
        }

        Ok(inner
            .collections
            .get(&key(user_id, collection))
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn subscribe(
        &self,
        user_id: &str,
        collection: &str,
    ) -> Result<mpsc::Receiver<Vec<DocumentChange>>> {
        let collection_key = key(user_id, collection);
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

        let initial: Vec<DocumentChange> = {
            let mut inner = self.lock();
            if inner.offline {
                return Err(Error::Remote("remote store is unreachable".to_string()));
            }

            let snapshot = inner
                .collections
                .get(&collection_key)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, fields)| DocumentChange {
                            kind: ChangeKind::Added,
                            doc: Document {
                                id: id.clone(),
                                fields: fields.clone(),
                            },
                        })
                        .collect()
                })
                .unwrap_or_default();

            inner
                .subscribers
                .entry(collection_key)
                .or_default()
                .push(tx.clone());
            snapshot
        };

        if !initial.is_empty() {
            // Fresh channel with spare capacity; mirror the initial snapshot
            // a push-based listener would deliver
            tx.send(initial).await.ok();
        }

        Ok(rx)
    }
}
