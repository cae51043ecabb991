//! Task model

use serde::{Deserialize, Serialize};

use super::{integer_or_null, opt_integer, opt_text, parse_id, text_or_null, EntityId, SyncEntity};
use crate::error::{Error, Result};
use crate::util::now_millis;

/// A to-do item owned by a single user.
///
/// Serialized field names follow the remote document format (camelCase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier
    pub id: EntityId,
    /// Owning user
    pub user_id: String,
    /// Short title shown in lists
    pub title: String,
    /// Optional longer description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional due timestamp (Unix ms)
    #[serde(default)]
    pub deadline: Option<i64>,
    /// Priority, higher sorts first
    pub priority: i32,
    /// Name of the list the task belongs to
    pub list_name: String,
    /// Completion flag
    pub completed: bool,
    /// Last modification timestamp (Unix ms)
    pub last_modified: i64,
}

impl Task {
    /// Create a new task with the given owner and title
    #[must_use]
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            deadline: None,
            priority: 1,
            list_name: "Default".to_string(),
            completed: false,
            last_modified: now_millis(),
        }
    }

    /// Mark the task completed (or not) and bump the modification timestamp
    #[must_use]
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self.last_modified = now_millis();
        self
    }
}

impl SyncEntity for Task {
    const COLLECTION: &'static str = "tasks";
    const TABLE: &'static str = "tasks";

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
        "completed ASC, priority DESC, deadline ASC"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "user_id",
            "title",
            "description",
            "deadline",
            "priority",
            "list_name",
            "completed",
            "last_modified",
        ]
    }

    fn bind(&self) -> Vec<libsql::Value> {
        vec![
            libsql::Value::Text(self.id.to_string()),
            libsql::Value::Text(self.user_id.clone()),
            libsql::Value::Text(self.title.clone()),
            text_or_null(self.description.as_deref()),
            integer_or_null(self.deadline),
            libsql::Value::Integer(i64::from(self.priority)),
            libsql::Value::Text(self.list_name.clone()),
            libsql::Value::Integer(i64::from(self.completed)),
            libsql::Value::Integer(self.last_modified),
        ]
    }

    fn from_row(row: &libsql::Row) -> Result<Self> {
        let priority: i64 = row.get(5)?;
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: opt_text(row, 3)?,
            deadline: opt_integer(row, 4)?,
            priority: i32::try_from(priority)
                .map_err(|_| Error::Database(format!("priority out of range: {priority}")))?,
            list_name: row.get(6)?,
            completed: row.get::<i64>(7)? != 0,
            last_modified: row.get(8)?,
        })
    }
}
