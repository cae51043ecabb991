//! Generic offline-first sync repository
//!
//! One [`Repository`] instance reconciles the local cache, the tombstone
//! store, and the remote document store for a single entity type. Writes are
//! local-first: the cache is updated immediately and the remote store is
//! updated on a best-effort basis, with the tombstone queue carrying deletion
//! intent until the remote delete is confirmed.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::auth::Session;
use crate::db::{Database, EntityStore, TombstoneStore};
use crate::error::Result;
use crate::models::{EntityId, Note, SyncEntity, Task, Tombstone, Transaction};
use crate::remote::{ChangeKind, DocumentChange, RemoteStore};
use crate::storage::BlobStore;

/// Repository over the task collection
pub type TaskRepository = Repository<Task>;
/// Repository over the note collection
pub type NoteRepository = Repository<Note>;
/// Repository over the finance transaction collection
pub type TransactionRepository = Repository<Transaction>;

/// Counters reported by one sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Local rows pushed to the remote store
    pub pushed: usize,
    /// Remote documents written into the local cache
    pub pulled: usize,
    /// Remote documents discarded because a tombstone exists
    pub skipped_tombstoned: usize,
    /// Remote documents discarded because the local row is newer
    pub kept_local: usize,
}

/// Counters reported by one pending-deletion pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeletionSummary {
    /// Tombstones confirmed remotely and cleared
    pub cleared: usize,
    /// Tombstones left in place for a later retry
    pub remaining: usize,
}

/// Owner handle for a realtime listener.
///
/// Dropping the handle stops the listener, so a caller that ties it to its
/// own lifetime gets guaranteed release on teardown.
#[derive(Debug)]
pub struct ListenerHandle {
    handle: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop the listener explicitly
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Whether the listener task is still running
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Single point of truth for one entity type, scoped to the calling user.
///
/// All reads are served from the local cache; the remote store is only ever
/// consulted by the explicit sync, pending-deletion, and listener pathways.
pub struct Repository<E: SyncEntity> {
    store: EntityStore<E>,
    tombstones: TombstoneStore,
    remote: Arc<dyn RemoteStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    changed: Arc<watch::Sender<u64>>,
    listener: Mutex<Option<AbortHandle>>,
}

impl<E: SyncEntity> Repository<E> {
    /// Create a repository over the given database and remote store
    pub fn new(db: &Database, remote: Arc<dyn RemoteStore>) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            store: EntityStore::new(db.connection().clone()),
            tombstones: TombstoneStore::new(db.connection().clone()),
            remote,
            blobs: None,
            changed: Arc::new(changed),
            listener: Mutex::new(None),
        }
    }

    /// Attach a blob store for entity-owned attachments (receipts)
    #[must_use]
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Live, continuously-updating view of the user's entities.
    ///
    /// Backed by the local cache only. With no session the view is empty and
    /// never updates.
    pub async fn observe_all(&self, session: Option<&Session>) -> Result<watch::Receiver<Vec<E>>> {
        let Some(session) = session else {
            let (_tx, rx) = watch::channel(Vec::new());
            return Ok(rx);
        };

        let user_id = session.user_id().to_string();
        let store = self.store.clone();
        let mut invalidations = self.changed.subscribe();

        let initial = store.list_for_user(&user_id).await?;
        let (tx, rx) = watch::channel(initial);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = invalidations.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        match store.list_for_user(&user_id).await {
                            Ok(items) => {
                                if tx.send(items).is_err() {
                                    break;
                                }
                            }
                            Err(error) => {
                                tracing::error!(
                                    collection = E::COLLECTION,
                                    "Failed to refresh live view: {error}"
                                );
                            }
                        }
                    }
                    () = tx.closed() => break,
                }
            }
        });

        Ok(rx)
    }

    /// Live single-entity view from the local cache
    pub async fn observe_by_id(&self, id: EntityId) -> Result<watch::Receiver<Option<E>>> {
        let store = self.store.clone();
        let mut invalidations = self.changed.subscribe();

        let initial = store.get(id).await?;
        let (tx, rx) = watch::channel(initial);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = invalidations.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        match store.get(id).await {
                            Ok(item) => {
                                if tx.send(item).is_err() {
                                    break;
                                }
                            }
                            Err(error) => {
                                tracing::error!(
                                    collection = E::COLLECTION,
                                    "Failed to refresh live view: {error}"
                                );
                            }
                        }
                    }
                    () = tx.closed() => break,
                }
            }
        });

        Ok(rx)
    }

    /// Insert an entity: durable locally first, then best-effort remote
    pub async fn insert(&self, entity: &E, session: Option<&Session>) -> Result<()> {
        self.save(entity, session).await
    }

    /// Update an entity; same local-first semantics as [`insert`](Self::insert)
    pub async fn update(&self, entity: &E, session: Option<&Session>) -> Result<()> {
        self.save(entity, session).await
    }

    async fn save(&self, entity: &E, session: Option<&Session>) -> Result<()> {
        self.store.upsert(entity, false).await?;
        self.notify();

        let Some(session) = session else {
            tracing::warn!(
                collection = E::COLLECTION,
                "Signed out; change saved locally only"
            );
            return Ok(());
        };

        self.try_push(entity, session).await;
        Ok(())
    }

    /// Push one entity to the remote store; marks the row synced on success.
    ///
    /// Failures are logged and left for the next sync pass, never surfaced.
    async fn try_push(&self, entity: &E, session: &Session) -> bool {
        let fields = match serde_json::to_value(entity) {
            Ok(fields) => fields,
            Err(error) => {
                tracing::error!(collection = E::COLLECTION, "Failed to serialize: {error}");
                return false;
            }
        };

        let id = entity.id();
        match self
            .remote
            .put_document(session.user_id(), E::COLLECTION, &id.to_string(), fields)
            .await
        {
            Ok(()) => {
                if let Err(error) = self.store.mark_synced(id).await {
                    tracing::error!(collection = E::COLLECTION, %id, "Failed to mark synced: {error}");
                }
                true
            }
            Err(error) => {
                tracing::error!(
                    collection = E::COLLECTION,
                    %id,
                    "Remote write failed, will retry on next sync: {error}"
                );
                false
            }
        }
    }

    /// Delete an entity locally and queue the remote deletion.
    ///
    /// The local row is gone when this returns; the tombstone carries the
    /// deletion upstream. Callers should follow up with
    /// [`attempt_pending_deletions`](Self::attempt_pending_deletions).
    pub async fn delete(&self, entity: &E, session: Option<&Session>) -> Result<()> {
        // Attached blobs are cleaned up first; an orphaned blob is acceptable,
        // a dangling reference is not
        if session.is_some() {
            if let (Some(url), Some(blobs)) = (entity.blob_url(), self.blobs.as_ref()) {
                if let Err(error) = blobs.delete_by_url(url).await {
                    tracing::warn!(
                        collection = E::COLLECTION,
                        "Failed to delete attached blob, proceeding: {error}"
                    );
                }
            }
        }

        self.store.delete(entity.id()).await?;
        self.tombstones
            .insert(&Tombstone::new(entity.id(), E::COLLECTION))
            .await?;
        self.notify();

        tracing::debug!(
            collection = E::COLLECTION,
            id = %entity.id(),
            "Deleted locally and queued for remote deletion"
        );
        Ok(())
    }

    /// Whether the remote store has confirmed the row's current state
    pub async fn is_synced(&self, id: EntityId) -> Result<Option<bool>> {
        self.store.is_synced(id).await
    }

    /// Tombstones still waiting for remote confirmation in this collection
    pub async fn pending_deletions(&self) -> Result<Vec<Tombstone>> {
        Ok(self
            .tombstones
            .list_all()
            .await?
            .into_iter()
            .filter(|tombstone| tombstone.collection == E::COLLECTION)
            .collect())
    }

    /// One-shot reconciliation pass against the remote store.
    ///
    /// Pushes unconfirmed local rows first, then pulls the full remote
    /// collection into the cache, skipping tombstoned ids and keeping local
    /// rows that are strictly newer than their remote counterpart. Running
    /// the pass twice with no intervening changes is a no-op.
    pub async fn sync_from_remote(&self, session: &Session) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        let dirty = self.store.list_unsynced(session.user_id()).await?;
        for entity in &dirty {
            if self.try_push(entity, session).await {
                summary.pushed += 1;
            }
        }

        let docs = match self
            .remote
            .fetch_collection(session.user_id(), E::COLLECTION)
            .await
        {
            Ok(docs) => docs,
            Err(error) => {
                tracing::error!(
                    collection = E::COLLECTION,
                    "Sync fetch failed, will retry later: {error}"
                );
                return Ok(summary);
            }
        };

        let tombstoned = self.tombstones.ids_for_collection(E::COLLECTION).await?;
        let mut applied = false;

        for doc in docs {
            if tombstoned.contains(&doc.id) {
                summary.skipped_tombstoned += 1;
                continue;
            }

            let entity: E = match serde_json::from_value(doc.fields) {
                Ok(entity) => entity,
                Err(error) => {
                    tracing::error!(
                        collection = E::COLLECTION,
                        id = doc.id,
                        "Skipping malformed remote document: {error}"
                    );
                    continue;
                }
            };

            match self.store.get(entity.id()).await? {
                Some(local) if local.last_modified() > entity.last_modified() => {
                    // Local edit is newer; keep it dirty so the next push
                    // phase uploads it
                    summary.kept_local += 1;
                }
                _ => {
                    self.store.upsert(&entity, true).await?;
                    summary.pulled += 1;
                    applied = true;
                }
            }
        }

        if applied {
            self.notify();
        }
        tracing::debug!(
            collection = E::COLLECTION,
            pushed = summary.pushed,
            pulled = summary.pulled,
            "Sync pass complete"
        );
        Ok(summary)
    }

    /// Retry the remote delete for every tombstone in this collection.
    ///
    /// A tombstone is cleared only when its remote delete succeeds; one
    /// failing id never aborts the rest.
    pub async fn attempt_pending_deletions(&self, session: &Session) -> Result<DeletionSummary> {
        let pending = self.pending_deletions().await?;
        let mut summary = DeletionSummary::default();
        if pending.is_empty() {
            return Ok(summary);
        }

        tracing::debug!(
            collection = E::COLLECTION,
            count = pending.len(),
            "Attempting to clear pending deletions"
        );

        for tombstone in pending {
            match self
                .remote
                .delete_document(session.user_id(), E::COLLECTION, &tombstone.id.to_string())
                .await
            {
                Ok(()) => {
                    self.tombstones
                        .remove(tombstone.id, E::COLLECTION)
                        .await?;
                    summary.cleared += 1;
                    tracing::debug!(collection = E::COLLECTION, id = %tombstone.id, "Remote delete confirmed");
                }
                Err(error) => {
                    summary.remaining += 1;
                    tracing::error!(
                        collection = E::COLLECTION,
                        id = %tombstone.id,
                        "Remote delete failed, will retry later: {error}"
                    );
                }
            }
        }
        Ok(summary)
    }

    /// Mirror remote change events into the local cache.
    ///
    /// Batches are applied by a single consumer task, one at a time, so the
    /// tombstone-check-then-write sequence never interleaves. Starting a new
    /// listener stops the previous one; the returned handle stops the
    /// listener when dropped.
    pub async fn start_listener(&self, session: &Session) -> Result<ListenerHandle> {
        self.stop_listener();

        let mut rx = self
            .remote
            .subscribe(session.user_id(), E::COLLECTION)
            .await?;

        let store = self.store.clone();
        let tombstones = self.tombstones.clone();
        let changed = Arc::clone(&self.changed);

        let handle = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                if let Err(error) = apply_change_batch::<E>(&store, &tombstones, &batch).await {
                    tracing::error!(
                        collection = E::COLLECTION,
                        "Failed to apply change batch: {error}"
                    );
                }
                changed.send_modify(|version| *version = version.wrapping_add(1));
            }
        });

        tracing::debug!(collection = E::COLLECTION, "Realtime listener attached");

        *self.listener_slot() = Some(handle.abort_handle());
        Ok(ListenerHandle { handle })
    }

    /// Stop the active listener, if any
    pub fn stop_listener(&self) {
        if let Some(previous) = self.listener_slot().take() {
            previous.abort();
            tracing::debug!(collection = E::COLLECTION, "Realtime listener removed");
        }
    }

    fn listener_slot(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changed
            .send_modify(|version| *version = version.wrapping_add(1));
    }
}

/// Apply one change batch under the same rules as the sync pass: tombstoned
/// ids are discarded, stale documents lose to newer local rows, and a
/// confirmed remote removal clears the matching tombstone.
async fn apply_change_batch<E: SyncEntity>(
    store: &EntityStore<E>,
    tombstones: &TombstoneStore,
    batch: &[DocumentChange],
) -> Result<()> {
    let tombstoned = tombstones.ids_for_collection(E::COLLECTION).await?;

    for change in batch {
        match change.kind {
            ChangeKind::Added | ChangeKind::Modified => {
                if tombstoned.contains(&change.doc.id) {
                    continue;
                }
                let entity: E = match serde_json::from_value(change.doc.fields.clone()) {
                    Ok(entity) => entity,
                    Err(error) => {
                        tracing::error!(
                            collection = E::COLLECTION,
                            id = change.doc.id,
                            "Skipping malformed change: {error}"
                        );
                        continue;
                    }
                };

                match store.get(entity.id()).await? {
                    Some(local) if local.last_modified() > entity.last_modified() => {}
                    _ => store.upsert(&entity, true).await?,
                }
            }
            ChangeKind::Removed => {
                let Ok(id) = change.doc.id.parse::<EntityId>() else {
                    tracing::error!(
                        collection = E::COLLECTION,
                        id = change.doc.id,
                        "Skipping removal with malformed id"
                    );
                    continue;
                };
                // The removal is remote-confirmed, so any matching tombstone
                // has served its purpose
                store.delete(id).await?;
                tombstones.remove(id, E::COLLECTION).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        _db: Database,
        repo: Repository<Task>,
        remote: MemoryRemoteStore,
    }

    async fn setup() -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let remote = MemoryRemoteStore::new();
        let repo = Repository::new(&db, Arc::new(remote.clone()));
        Fixture {
            _db: db,
            repo,
            remote,
        }
    }

    fn session() -> Session {
        Session::new("u1")
    }

    async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, pred: F)
    where
        F: Fn(&T) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if pred(&rx.borrow()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_observe_all_without_session_is_empty() {
        let fx = setup().await;
        fx.repo
            .insert(&Task::new("u1", "Buy milk"), None)
            .await
            .unwrap();

        let rx = fx.repo.observe_all(None).await.unwrap();
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_is_visible_and_pushed() {
        let fx = setup().await;
        let task = Task::new("u1", "Buy milk");

        fx.repo.insert(&task, Some(&session())).await.unwrap();

        let rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(fx.repo.is_synced(task.id).await.unwrap(), Some(true));
        assert!(fx
            .remote
            .document("u1", "tasks", &task.id.to_string())
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_failure_is_not_surfaced() {
        let fx = setup().await;
        fx.remote.set_offline(true);
        let task = Task::new("u1", "Buy milk");

        // Remote is down but the local write must succeed silently
        fx.repo.insert(&task, Some(&session())).await.unwrap();

        assert_eq!(fx.repo.is_synced(task.id).await.unwrap(), Some(false));
        assert_eq!(fx.remote.collection_len("u1", "tasks"), 0);
    }

    // Offline insert stays local until the next sync pass pushes it
    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_insert_synced_later() {
        let fx = setup().await;
        let task = Task::new("u1", "Buy milk");

        fx.repo.insert(&task, None).await.unwrap();
        let rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(fx.remote.collection_len("u1", "tasks"), 0);

        let summary = fx.repo.sync_from_remote(&session()).await.unwrap();
        assert_eq!(summary.pushed, 1);
        assert!(fx
            .remote
            .document("u1", "tasks", &task.id.to_string())
            .is_some());
        assert_eq!(fx.repo.is_synced(task.id).await.unwrap(), Some(true));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_removes_row_and_creates_tombstone() {
        let fx = setup().await;
        let task = Task::new("u1", "Buy milk");
        fx.repo.insert(&task, Some(&session())).await.unwrap();

        let mut rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        fx.repo.delete(&task, Some(&session())).await.unwrap();

        wait_for(&mut rx, Vec::is_empty).await;
        let pending = fx.repo.pending_deletions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, task.id);
        assert_eq!(pending[0].collection, "tasks");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_delete_is_idempotent() {
        let fx = setup().await;
        let task = Task::new("u1", "Buy milk");
        fx.repo.insert(&task, Some(&session())).await.unwrap();

        fx.repo.delete(&task, Some(&session())).await.unwrap();
        fx.repo.delete(&task, Some(&session())).await.unwrap();

        assert_eq!(fx.repo.pending_deletions().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_skips_tombstoned_ids() {
        let fx = setup().await;
        let task = Task::new("u1", "Buy milk");
        fx.repo.insert(&task, Some(&session())).await.unwrap();

        // Deleted locally; remote still has the document
        fx.repo.delete(&task, Some(&session())).await.unwrap();

        let summary = fx.repo.sync_from_remote(&session()).await.unwrap();
        assert_eq!(summary.skipped_tombstoned, 1);
        assert_eq!(summary.pulled, 0);

        let rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_is_idempotent() {
        let fx = setup().await;
        for title in ["One", "Two", "Three"] {
            let task = Task::new("u1", title);
            fx.remote
                .put_document(
                    "u1",
                    "tasks",
                    &task.id.to_string(),
                    serde_json::to_value(&task).unwrap(),
                )
                .await
                .unwrap();
        }

        fx.repo.sync_from_remote(&session()).await.unwrap();
        let rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        let first = rx.borrow().clone();

        fx.repo.sync_from_remote(&session()).await.unwrap();
        let rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        let second = rx.borrow().clone();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_keeps_newer_local_edit() {
        let fx = setup().await;
        let mut task = Task::new("u1", "Remote title");
        fx.remote
            .put_document(
                "u1",
                "tasks",
                &task.id.to_string(),
                serde_json::to_value(&task).unwrap(),
            )
            .await
            .unwrap();

        // Offline edit, strictly newer than the remote document
        task.title = "Edited offline".to_string();
        task.last_modified += 1000;
        fx.repo.insert(&task, None).await.unwrap();

        // Push phase uploads the edit before the pull can consider the stale
        // remote copy, and the local row survives either way
        let summary = fx.repo.sync_from_remote(&session()).await.unwrap();
        assert_eq!(summary.pushed, 1);

        let kept = fx
            .repo
            .observe_by_id(task.id)
            .await
            .unwrap()
            .borrow()
            .clone()
            .unwrap();
        assert_eq!(kept.title, "Edited offline");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_remote_document_loses_to_local_row() {
        let fx = setup().await;
        let task = Task::new("u1", "Newer local");
        fx.repo.insert(&task, None).await.unwrap();

        let mut stale = task.clone();
        stale.title = "Stale remote".to_string();
        stale.last_modified -= 1000;
        fx.remote
            .put_document(
                "u1",
                "tasks",
                &stale.id.to_string(),
                serde_json::to_value(&stale).unwrap(),
            )
            .await
            .unwrap();

        let summary = fx.repo.sync_from_remote(&session()).await.unwrap();
        assert!(summary.kept_local >= 1 || summary.pushed >= 1);

        let kept = fx
            .repo
            .observe_by_id(task.id)
            .await
            .unwrap()
            .borrow()
            .clone()
            .unwrap();
        assert_eq!(kept.title, "Newer local");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_deletions_tolerate_partial_failure() {
        let fx = setup().await;
        let keep_failing = Task::new("u1", "B");
        let deletable = Task::new("u1", "A");
        fx.repo
            .insert(&deletable, Some(&session()))
            .await
            .unwrap();
        fx.repo
            .insert(&keep_failing, Some(&session()))
            .await
            .unwrap();

        fx.repo.delete(&deletable, Some(&session())).await.unwrap();
        fx.repo
            .delete(&keep_failing, Some(&session()))
            .await
            .unwrap();
        fx.remote.deny_delete(&keep_failing.id.to_string());

        let summary = fx
            .repo
            .attempt_pending_deletions(&session())
            .await
            .unwrap();
        assert_eq!(summary.cleared, 1);
        assert_eq!(summary.remaining, 1);

        let pending = fx.repo.pending_deletions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, keep_failing.id);
        assert!(fx
            .remote
            .document("u1", "tasks", &deletable.id.to_string())
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_listener_skips_tombstoned_adds_and_modifies() {
        let fx = setup().await;
        let tombstoned = Task::new("u1", "Deleted here");
        let incoming = Task::new("u1", "From another device");

        fx.repo
            .insert(&tombstoned, Some(&session()))
            .await
            .unwrap();
        fx.repo.delete(&tombstoned, Some(&session())).await.unwrap();
        fx.remote
            .put_document(
                "u1",
                "tasks",
                &incoming.id.to_string(),
                serde_json::to_value(&incoming).unwrap(),
            )
            .await
            .unwrap();

        let _listener = fx.repo.start_listener(&session()).await.unwrap();

        let mut rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        wait_for(&mut rx, |tasks: &Vec<Task>| {
            tasks.iter().any(|t| t.id == incoming.id)
        })
        .await;

        let tasks = rx.borrow().clone();
        assert_eq!(tasks.len(), 1, "tombstoned id must not be re-inserted");

        // A Modified event for the tombstoned id is discarded just like the
        // initial Added snapshot was
        let mut edited = tombstoned.clone();
        edited.title = "Edited elsewhere".to_string();
        edited.last_modified += 1000;
        fx.remote
            .put_document(
                "u1",
                "tasks",
                &edited.id.to_string(),
                serde_json::to_value(&edited).unwrap(),
            )
            .await
            .unwrap();

        // A later change to the live task flushes the batch queue, proving
        // the tombstoned update was already processed and dropped
        let mut renamed = incoming.clone();
        renamed.title = "Renamed elsewhere".to_string();
        renamed.last_modified += 1000;
        fx.remote
            .put_document(
                "u1",
                "tasks",
                &renamed.id.to_string(),
                serde_json::to_value(&renamed).unwrap(),
            )
            .await
            .unwrap();

        wait_for(&mut rx, |tasks: &Vec<Task>| {
            tasks.iter().any(|t| t.title == "Renamed elsewhere")
        })
        .await;

        let tasks = rx.borrow().clone();
        assert_eq!(tasks.len(), 1, "modified tombstoned id must stay absent");
    }

    // A remote-confirmed removal clears the matching tombstone
    #[tokio::test(flavor = "multi_thread")]
    async fn test_listener_removal_clears_tombstone() {
        let fx = setup().await;
        let task = Task::new("u1", "Deleted everywhere");
        fx.repo.insert(&task, Some(&session())).await.unwrap();
        fx.repo.delete(&task, Some(&session())).await.unwrap();
        assert_eq!(fx.repo.pending_deletions().await.unwrap().len(), 1);

        let _listener = fx.repo.start_listener(&session()).await.unwrap();

        // Another client confirms the delete upstream
        fx.remote
            .delete_document("u1", "tasks", &task.id.to_string())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if fx.repo.pending_deletions().await.unwrap().is_empty() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("tombstone not cleared");

        let rx = fx.repo.observe_all(Some(&session())).await.unwrap();
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_listener_replaces_previous() {
        let fx = setup().await;

        let first = fx.repo.start_listener(&session()).await.unwrap();
        let _second = fx.repo.start_listener(&session()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while first.is_active() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first listener was not stopped");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_listener_releases_subscription() {
        let fx = setup().await;
        let handle = fx.repo.start_listener(&session()).await.unwrap();

        fx.repo.stop_listener();

        tokio::time::timeout(Duration::from_secs(2), async {
            while handle.is_active() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("listener was not stopped");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transaction_delete_cleans_up_receipt() {
        use crate::storage::BlobStore;
        use async_trait::async_trait;
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct RecordingBlobStore {
            deleted: StdMutex<Vec<String>>,
        }

        #[async_trait]
        impl BlobStore for RecordingBlobStore {
            async fn upload(
                &self,
                key: &str,
                _bytes: Vec<u8>,
                _content_type: &str,
            ) -> Result<String> {
                Ok(format!("https://blobs.example.com/{key}"))
            }

            async fn delete_by_url(&self, url: &str) -> Result<()> {
                self.deleted.lock().unwrap().push(url.to_string());
                Ok(())
            }
        }

        let db = Database::open_in_memory().await.unwrap();
        let remote = MemoryRemoteStore::new();
        let blobs = Arc::new(RecordingBlobStore::default());
        let repo: Repository<Transaction> =
            Repository::new(&db, Arc::new(remote)).with_blob_store(blobs.clone());

        let tx = Transaction::new("u1", "Coffee", 4.5)
            .with_receipt("https://blobs.example.com/receipts/u1/r1.jpg");
        repo.insert(&tx, Some(&session())).await.unwrap();
        repo.delete(&tx, Some(&session())).await.unwrap();

        assert_eq!(
            blobs.deleted.lock().unwrap().as_slice(),
            ["https://blobs.example.com/receipts/u1/r1.jpg"]
        );
    }
}
