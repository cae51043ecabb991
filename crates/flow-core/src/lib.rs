//! flow-core - Core library for Flow
//!
//! This crate contains the shared models, local cache, and offline-first sync
//! logic used by all Flow interfaces (mobile, desktop, CLI). Writes land in
//! the local store immediately and propagate to the remote document store on
//! a best-effort basis; deletions are queued as tombstones until the remote
//! delete is confirmed.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod repo;
pub mod services;
pub mod storage;
pub mod util;

pub use auth::Session;
pub use error::{Error, Result};
pub use models::{EntityId, Note, Task, Tombstone, Transaction};
pub use repo::{NoteRepository, Repository, TaskRepository, TransactionRepository};
pub use services::CoreService;
