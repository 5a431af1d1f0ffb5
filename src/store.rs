//! Document store over libsql.
//!
//! Groups live in a top-level `groups` collection, expenses and incomes in
//! per-group `groups/{group_id}/expenses` and `groups/{group_id}/incomes`
//! collections. Bodies are JSON documents whose shape is only checked on
//! read: every document passes through [`normalize_expense`],
//! [`normalize_income`] or [`normalize_group`] before it leaves this module.
//!
//! Every expense write publishes the affected group id on a broadcast channel
//! so live feeds can re-read their collection.

use libsql::Connection;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::FEED_CHANGE_CAPACITY;
use crate::database::{Db, init_db};
use crate::models::{Expense, GroupMeta, Income, RawExpense, RawGroup, RawIncome};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The database could not be reached or the operation failed.
    Unavailable(String),
    NotFound(String),
    /// The request names something the store cannot address, e.g. a month
    /// outside the representable calendar.
    InvalidInput(String),
    /// A stored document could not be normalised.
    Malformed { id: String, reason: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StoreError::NotFound(what) => write!(f, "Not found: {}", what),
            StoreError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            StoreError::Malformed { id, reason } => {
                write!(f, "Malformed document {}: {}", id, reason)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<libsql::Error> for StoreError {
    fn from(e: libsql::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Unavailable(format!("document encoding failed: {}", e))
    }
}

/// Per-group document collections.
#[derive(Debug, Clone, Copy)]
enum GroupCollection {
    Expenses,
    Incomes,
}

impl GroupCollection {
    fn table(self) -> &'static str {
        match self {
            GroupCollection::Expenses => "expenses",
            GroupCollection::Incomes => "incomes",
        }
    }
}

#[derive(Clone)]
pub struct Store {
    db: Db,
    changes: broadcast::Sender<String>,
}

impl Store {
    pub fn new(db: Db) -> Self {
        let (changes, _) = broadcast::channel(FEED_CHANGE_CAPACITY);
        Store { db, changes }
    }

    pub async fn open(data_dir: &str) -> anyhow::Result<Self> {
        Ok(Store::new(init_db(data_dir).await?))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Receiver of group ids whose expense collection changed.
    pub fn watch(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    fn notify(&self, group_id: &str) {
        // No receivers simply means no live feeds are open.
        let _ = self.changes.send(group_id.to_string());
    }

    pub async fn insert_group_document(&self, body: &Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(body)?;

        let conn = self.db.write().await;
        conn.execute(
            "INSERT INTO groups (id, body) VALUES (?, ?)",
            (id.as_str(), body.as_str()),
        )
        .await?;

        Ok(id)
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Option<GroupMeta>, StoreError> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query("SELECT id, body FROM groups WHERE id = ?", [group_id])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let id: String = row.get(0)?;
                let body: String = row.get(1)?;
                normalize_group(&id, &body).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Groups whose `users` array contains `user_id`, in insertion order.
    pub async fn groups_containing(&self, user_id: &str) -> Result<Vec<GroupMeta>, StoreError> {
        let conn = self.db.read().await;
        query_groups_containing(&conn, user_id).await
    }

    /// Inserts `body` as a new group unless `user_id` already belongs to one.
    ///
    /// The membership check and the insert run under a single write lock, so
    /// concurrent callers for the same user insert at most one group.
    pub async fn insert_group_unless_member(
        &self,
        user_id: &str,
        body: &Value,
    ) -> Result<Option<String>, StoreError> {
        let id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(body)?;

        let conn = self.db.write().await;
        if !query_groups_containing(&conn, user_id).await?.is_empty() {
            return Ok(None);
        }
        conn.execute(
            "INSERT INTO groups (id, body) VALUES (?, ?)",
            (id.as_str(), body.as_str()),
        )
        .await?;

        Ok(Some(id))
    }

    async fn insert_group_document_into(
        &self,
        collection: GroupCollection,
        group_id: &str,
        body: &Value,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(body)?;

        let conn = self.db.write().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, group_id, body) VALUES (?, ?, ?)",
                collection.table()
            ),
            (id.as_str(), group_id, body.as_str()),
        )
        .await?;

        Ok(id)
    }

    /// Raw `(id, body)` rows of a group collection, in store order.
    async fn group_documents(
        &self,
        collection: GroupCollection,
        group_id: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT id, body FROM {} WHERE group_id = ? ORDER BY seq",
                    collection.table()
                ),
                [group_id],
            )
            .await?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push((row.get(0)?, row.get(1)?));
        }
        Ok(documents)
    }

    pub async fn insert_expense_document(
        &self,
        group_id: &str,
        body: &Value,
    ) -> Result<String, StoreError> {
        let id = self
            .insert_group_document_into(GroupCollection::Expenses, group_id, body)
            .await?;
        self.notify(group_id);
        Ok(id)
    }

    /// Every well-formed expense of the group, in store order.
    pub async fn expense_documents(&self, group_id: &str) -> Result<Vec<Expense>, StoreError> {
        let documents = self
            .group_documents(GroupCollection::Expenses, group_id)
            .await?;

        let mut expenses = Vec::new();
        for (id, body) in documents {
            match normalize_expense(&id, &body) {
                Ok(expense) => expenses.push(expense),
                Err(e) => log::warn!("skipping expense document in group {}: {}", group_id, e),
            }
        }
        Ok(expenses)
    }

    /// Incomes do not drive the live expense feed, so no change is published.
    pub async fn insert_income_document(
        &self,
        group_id: &str,
        body: &Value,
    ) -> Result<String, StoreError> {
        self.insert_group_document_into(GroupCollection::Incomes, group_id, body)
            .await
    }

    /// Every well-formed income of the group, in store order.
    pub async fn income_documents(&self, group_id: &str) -> Result<Vec<Income>, StoreError> {
        let documents = self
            .group_documents(GroupCollection::Incomes, group_id)
            .await?;

        let mut incomes = Vec::new();
        for (id, body) in documents {
            match normalize_income(&id, &body) {
                Ok(income) => incomes.push(income),
                Err(e) => log::warn!("skipping income document in group {}: {}", group_id, e),
            }
        }
        Ok(incomes)
    }
}

async fn query_groups_containing(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<GroupMeta>, StoreError> {
    let mut rows = conn
        .query(
            "SELECT g.id, g.body FROM groups g \
             WHERE EXISTS (SELECT 1 FROM json_each(g.body, '$.users') m WHERE m.value = ?) \
             ORDER BY g.seq",
            [user_id],
        )
        .await?;

    let mut groups = Vec::new();
    while let Some(row) = rows.next().await? {
        let id: String = row.get(0)?;
        let body: String = row.get(1)?;
        match normalize_group(&id, &body) {
            Ok(group) => groups.push(group),
            Err(e) => log::warn!("skipping group document: {}", e),
        }
    }
    Ok(groups)
}

fn malformed(id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Parses a stored expense body into the strict [`Expense`] shape.
///
/// Rejects a missing/negative/non-finite amount, an empty category and a
/// missing or unreadable `expenseDate`. An empty segregation is dropped, a
/// missing description becomes empty and a missing `createdAt` falls back to
/// `expenseDate`.
pub fn normalize_expense(id: &str, body: &str) -> Result<Expense, StoreError> {
    let raw: RawExpense = serde_json::from_str(body).map_err(|e| malformed(id, e.to_string()))?;

    let amount = raw.amount.ok_or_else(|| malformed(id, "missing amount"))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(malformed(id, format!("invalid amount {}", amount)));
    }

    let category = raw
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| malformed(id, "missing category"))?;

    let expense_date = raw
        .expense_date
        .as_ref()
        .and_then(|t| t.to_datetime())
        .ok_or_else(|| malformed(id, "missing or invalid expenseDate"))?;

    let created_at = raw
        .created_at
        .as_ref()
        .and_then(|t| t.to_datetime())
        .unwrap_or(expense_date);

    Ok(Expense {
        id: id.to_string(),
        user_id: raw.user_id.unwrap_or_default(),
        amount,
        category,
        segregation: raw
            .segregation
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        description: raw.description.unwrap_or_default(),
        expense_date,
        created_at,
    })
}

/// Same rules as [`normalize_expense`] with `source` in place of the
/// category and `incomeDate` as the required date.
pub fn normalize_income(id: &str, body: &str) -> Result<Income, StoreError> {
    let raw: RawIncome = serde_json::from_str(body).map_err(|e| malformed(id, e.to_string()))?;

    let amount = raw.amount.ok_or_else(|| malformed(id, "missing amount"))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(malformed(id, format!("invalid amount {}", amount)));
    }

    let source = raw
        .source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed(id, "missing source"))?;

    let income_date = raw
        .income_date
        .as_ref()
        .and_then(|t| t.to_datetime())
        .ok_or_else(|| malformed(id, "missing or invalid incomeDate"))?;

    let created_at = raw
        .created_at
        .as_ref()
        .and_then(|t| t.to_datetime())
        .unwrap_or(income_date);

    Ok(Income {
        id: id.to_string(),
        user_id: raw.user_id.unwrap_or_default(),
        amount,
        source,
        income_date,
        created_at,
    })
}

pub fn normalize_group(id: &str, body: &str) -> Result<GroupMeta, StoreError> {
    let raw: RawGroup = serde_json::from_str(body).map_err(|e| malformed(id, e.to_string()))?;

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| malformed(id, "missing name"))?;

    let users = raw.users;
    let admins: Vec<String> = raw
        .admins
        .into_iter()
        .filter(|a| users.contains(a))
        .collect();

    let created_at = raw
        .created_at
        .as_ref()
        .and_then(|t| t.to_datetime())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);

    Ok(GroupMeta {
        id: id.to_string(),
        name,
        users,
        admins,
        created_at,
    })
}
