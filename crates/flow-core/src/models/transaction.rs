//! Finance transaction model

use serde::{Deserialize, Serialize};

use super::{opt_text, parse_id, text_or_null, EntityId, SyncEntity};
use crate::error::Result;
use crate::util::now_millis;

/// A single income or expense entry, optionally with an uploaded receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier
    pub id: EntityId,
    /// Owning user
    pub user_id: String,
    /// Human-readable description
    pub description: String,
    /// Amount, always positive; direction comes from `income`
    pub amount: f64,
    /// Business date of the transaction (Unix ms)
    pub date: i64,
    /// True for income, false for expense
    pub income: bool,
    /// Free-form category label
    pub category: String,
    /// URL of the uploaded receipt image, if any
    #[serde(default)]
    pub receipt_url: Option<String>,
    /// Last modification timestamp (Unix ms)
    pub last_modified: i64,
}

impl Transaction {
    /// Create a new transaction dated now
    #[must_use]
    pub fn new(user_id: impl Into<String>, description: impl Into<String>, amount: f64) -> Self {
        let now = now_millis();
        Self {
            id: EntityId::new(),
            user_id: user_id.into(),
            description: description.into(),
            amount,
            date: now,
            income: false,
            category: String::new(),
            receipt_url: None,
            last_modified: now,
        }
    }

    /// Attach a receipt URL and bump the modification timestamp
    #[must_use]
    pub fn with_receipt(mut self, url: impl Into<String>) -> Self {
        self.receipt_url = Some(url.into());
        self.last_modified = now_millis();
        self
    }
}

impl SyncEntity for Transaction {
    const COLLECTION: &'static str = "transactions";
    const TABLE: &'static str = "transactions";

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
        "date DESC"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "user_id",
            "description",
            "amount",
            "date",
            "income",
            "category",
            "receipt_url",
            "last_modified",
        ]
    }

    fn bind(&self) -> Vec<libsql::Value> {
        vec![
            libsql::Value::Text(self.id.to_string()),
            libsql::Value::Text(self.user_id.clone()),
            libsql::Value::Text(self.description.clone()),
            libsql::Value::Real(self.amount),
            libsql::Value::Integer(self.date),
            libsql::Value::Integer(i64::from(self.income)),
            libsql::Value::Text(self.category.clone()),
            text_or_null(self.receipt_url.as_deref()),
            libsql::Value::Integer(self.last_modified),
        ]
    }

    fn from_row(row: &libsql::Row) -> Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: row.get(1)?,
            description: row.get(2)?,
            amount: row.get(3)?,
            date: row.get(4)?,
            income: row.get::<i64>(5)? != 0,
            category: row.get(6)?,
            receipt_url: opt_text(row, 7)?,
            last_modified: row.get(8)?,
        })
    }

    fn blob_url(&self) -> Option<&str> {
        self.receipt_url.as_deref()
    }
}
