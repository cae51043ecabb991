//! Note model

use serde::{Deserialize, Serialize};

use super::{opt_text, parse_id, text_or_null, EntityId, SyncEntity};
use crate::error::Result;
use crate::util::now_millis;

/// A free-form note, optionally locked behind a password.
///
/// The password hash is opaque to the core; hashing and prompting are the
/// shell's concern. A locked note still syncs like any other entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: EntityId,
    /// Owning user
    pub user_id: String,
    /// Title shown in lists
    pub title: String,
    /// Note body
    pub content: String,
    /// Whether the note is locked
    pub locked: bool,
    /// Opaque password hash for locked notes
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Last modification timestamp (Unix ms)
    pub last_modified: i64,
}

impl Note {
    /// Create a new unlocked note
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            user_id: user_id.into(),
            title: title.into(),
            content: content.into(),
            locked: false,
            password_hash: None,
            last_modified: now_millis(),
        }
    }

    /// Lock the note behind the given (already hashed) password
    #[must_use]
    pub fn with_lock(mut self, password_hash: impl Into<String>) -> Self {
        self.locked = true;
        self.password_hash = Some(password_hash.into());
        self.last_modified = now_millis();
        self
    }
}

impl SyncEntity for Note {
    const COLLECTION: &'static str = "notes";
    const TABLE: &'static str = "notes";

    fn id(&self) -> EntityId {
        self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }

    fn order_by() -> &'static str {
        "last_modified DESC"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "user_id",
            "title",
            "content",
            "locked",
            "password_hash",
            "last_modified",
        ]
    }

    fn bind(&self) -> Vec<libsql::Value> {
        vec![
            libsql::Value::Text(self.id.to_string()),
            libsql::Value::Text(self.user_id.clone()),
            libsql::Value::Text(self.title.clone()),
            libsql::Value::Text(self.content.clone()),
            libsql::Value::Integer(i64::from(self.locked)),
            text_or_null(self.password_hash.as_deref()),
            libsql::Value::Integer(self.last_modified),
        ]
    }

    fn from_row(row: &libsql::Row) -> Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            locked: row.get::<i64>(4)? != 0,
            password_hash: opt_text(row, 5)?,
            last_modified: row.get(6)?,
        })
    }
}
