//! Top-level service facade
//!
//! [`CoreService`] wires the database, the remote store, and the three
//! entity repositories together so app shells hold a single object. The
//! startup sequence for a signed-in user is: `sync_all`, `start_listeners`,
//! and after any local delete another `sync_all` (or a direct
//! `attempt_pending_deletions` on the affected repository).

use std::sync::Arc;

use crate::auth::{Session, SessionState};
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};
use crate::repo::{
    DeletionSummary, ListenerHandle, NoteRepository, Repository, SyncSummary, TaskRepository,
    TransactionRepository,
};
use crate::storage::{receipt_key, BlobStore, HttpBlobStore};

/// Sync outcome for one collection: pending deletions first, then the
/// push/pull pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionReport {
    pub deletions: DeletionSummary,
    pub sync: SyncSummary,
}

/// Outcome of a full [`CoreService::sync_all`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub tasks: CollectionReport,
    pub notes: CollectionReport,
    pub transactions: CollectionReport,
}

/// Handles for the three collection listeners; dropping stops all of them.
#[derive(Debug)]
pub struct Listeners {
    pub tasks: ListenerHandle,
    pub notes: ListenerHandle,
    pub transactions: ListenerHandle,
}

/// Everything an app shell needs: the repositories, session state, and the
/// sync entry points.
pub struct CoreService {
    _db: Database,
    tasks: TaskRepository,
    notes: NoteRepository,
    transactions: TransactionRepository,
    blobs: Option<Arc<dyn BlobStore>>,
    session: SessionState,
}

impl CoreService {
    /// Open a service from configuration.
    ///
    /// With no remote URL configured the service runs against a
    /// process-local in-memory remote, so all repository pathways still work
    /// but nothing leaves the device.
    pub async fn open(config: &CoreConfig) -> Result<Self> {
        let db = match &config.database_path {
            Some(path) => Database::open(path).await?,
            None => Database::open_in_memory().await?,
        };

        let remote: Arc<dyn RemoteStore> = match &config.remote_base_url {
            Some(url) => Arc::new(
                HttpRemoteStore::new(url, config.remote_api_key.clone())?
                    .with_poll_interval(config.poll_interval()),
            ),
            None => Arc::new(MemoryRemoteStore::new()),
        };

        let blobs: Option<Arc<dyn BlobStore>> = match &config.media_base_url {
            Some(url) => Some(Arc::new(HttpBlobStore::new(
                url,
                config.remote_api_key.clone(),
            )?)),
            None => None,
        };

        Ok(Self::assemble(db, remote, blobs))
    }

    /// Build a service over pre-constructed stores (tests, embedded shells)
    #[must_use]
    pub fn with_stores(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self::assemble(db, remote, blobs)
    }

    fn assemble(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        let tasks = Repository::new(&db, Arc::clone(&remote));
        let notes = Repository::new(&db, Arc::clone(&remote));
        let mut transactions = Repository::new(&db, remote);
        if let Some(blobs) = &blobs {
            transactions = transactions.with_blob_store(Arc::clone(blobs));
        }

        Self {
            _db: db,
            tasks,
            notes,
            transactions,
            blobs,
            session: SessionState::new(),
        }
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskRepository {
        &self.tasks
    }

    #[must_use]
    pub fn notes(&self) -> &NoteRepository {
        &self.notes
    }

    #[must_use]
    pub fn transactions(&self) -> &TransactionRepository {
        &self.transactions
    }

    /// Shared login state for the owning shell
    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Reconcile every collection with the remote store.
    ///
    /// Pending deletions are retried before each collection's push/pull pass
    /// so a document deleted on this device is not pulled straight back in.
    pub async fn sync_all(&self, session: &Session) -> Result<SyncReport> {
        Ok(SyncReport {
            tasks: sync_collection(&self.tasks, session).await?,
            notes: sync_collection(&self.notes, session).await?,
            transactions: sync_collection(&self.transactions, session).await?,
        })
    }

    /// Attach realtime listeners for every collection.
    ///
    /// Starting listeners again (after a user switch) replaces the previous
    /// set.
    pub async fn start_listeners(&self, session: &Session) -> Result<Listeners> {
        Ok(Listeners {
            tasks: self.tasks.start_listener(session).await?,
            notes: self.notes.start_listener(session).await?,
            transactions: self.transactions.start_listener(session).await?,
        })
    }

    /// Stop all active listeners
    pub fn stop_listeners(&self) {
        self.tasks.stop_listener();
        self.notes.stop_listener();
        self.transactions.stop_listener();
    }

    /// Upload a receipt image and record it on the transaction.
    ///
    /// The blob goes up first; the transaction row is only updated once the
    /// upload has a URL, so a failed upload leaves the transaction untouched.
    pub async fn attach_receipt(
        &self,
        transaction: Transaction,
        bytes: Vec<u8>,
        session: &Session,
    ) -> Result<Transaction> {
        let Some(blobs) = &self.blobs else {
            return Err(Error::Storage(
                "no blob store configured for receipts".to_string(),
            ));
        };

        let key = receipt_key(session.user_id(), transaction.id);
        let url = blobs.upload(key.as_str(), bytes, "image/jpeg").await?;

        let updated = transaction.with_receipt(url);
        self.transactions.update(&updated, Some(session)).await?;
        Ok(updated)
    }
}

async fn sync_collection<E: crate::models::SyncEntity>(
    repo: &Repository<E>,
    session: &Session,
) -> Result<CollectionReport> {
    Ok(CollectionReport {
        deletions: repo.attempt_pending_deletions(session).await?,
        sync: repo.sync_from_remote(session).await?,
    })
}
