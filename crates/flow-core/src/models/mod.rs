//! Data models for Flow

mod id;
mod note;
mod task;
mod tombstone;
mod transaction;

pub use id::EntityId;
pub use note::Note;
pub use task::Task;
pub use tombstone::Tombstone;
pub use transaction::Transaction;

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Capability set a type needs to flow through the generic sync repository.
///
/// Implementors declare which local table and remote collection they live in,
/// how their rows bind and parse, and which timestamp drives last-writer-wins
/// reconciliation. Columns in [`columns`](SyncEntity::columns), the values
/// returned by [`bind`](SyncEntity::bind), and the indices read by
/// [`from_row`](SyncEntity::from_row) must all line up.
pub trait SyncEntity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Remote collection name (`users/{userId}/{COLLECTION}/{id}`)
    const COLLECTION: &'static str;
    /// Local cache table name
    const TABLE: &'static str;

    /// Stable client-generated identifier
    fn id(&self) -> EntityId;

    /// Owning user; partitions all queries
    fn user_id(&self) -> &str;

    /// Unix-ms modification timestamp used for sync reconciliation
    fn last_modified(&self) -> i64;

    /// ORDER BY clause for the user-facing list view
    fn order_by() -> &'static str;

    /// Column names, excluding the repository-managed `synced` flag
    fn columns() -> &'static [&'static str];

    /// Values for [`columns`](SyncEntity::columns), in order
    fn bind(&self) -> Vec<libsql::Value>;

    /// Parse an entity from a row selected with [`columns`](SyncEntity::columns)
    fn from_row(row: &libsql::Row) -> Result<Self>;

    /// URL of an attached remote blob, if the entity owns one
    fn blob_url(&self) -> Option<&str> {
        None
    }
}

pub(crate) fn text_or_null(value: Option<&str>) -> libsql::Value {
    value.map_or(libsql::Value::Null, |v| {
        libsql::Value::Text(v.to_string())
    })
}

pub(crate) fn integer_or_null(value: Option<i64>) -> libsql::Value {
    value.map_or(libsql::Value::Null, libsql::Value::Integer)
}

pub(crate) fn opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(text) => Ok(Some(text)),
        other => Err(Error::Database(format!(
            "expected TEXT or NULL at column {idx}, got {other:?}"
        ))),
    }
}

pub(crate) fn opt_integer(row: &libsql::Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected INTEGER or NULL at column {idx}, got {other:?}"
        ))),
    }
}

pub(crate) fn parse_id(row: &libsql::Row, idx: i32) -> Result<EntityId> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|_| Error::Database(format!("invalid entity id in row: {raw}")))
}
