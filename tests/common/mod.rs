#![allow(dead_code)]

use std::time::Duration as StdDuration;

use group_expense_server::feed::{FeedUpdate, Subscription};
use group_expense_server::models::{Expense, RawExpense, RawTimestamp};
use group_expense_server::preferences::Preferences;
use group_expense_server::push::PushService;
use group_expense_server::store::Store;
use tempfile::TempDir;
use time::OffsetDateTime;

pub const FEED_WAIT: StdDuration = StdDuration::from_secs(5);
pub const QUIET_WAIT: StdDuration = StdDuration::from_millis(200);

pub struct TestEnv {
    pub store: Store,
    pub preferences: Preferences,
    pub push: PushService,
    // Keeps the database directory alive for the test.
    _temp_dir: TempDir,
}

pub async fn setup_test_env() -> TestEnv {
    let temp_dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let data_path = temp_dir
        .path()
        .to_str()
        .expect("Failed to convert path to string")
        .to_string();

    let store = Store::open(&data_path)
        .await
        .unwrap_or_else(|e| panic!("Failed to open store at {}: {}", data_path, e));
    let db = store.db().clone();

    TestEnv {
        store,
        preferences: Preferences::new(db.clone()),
        push: PushService::new(db),
        _temp_dir: temp_dir,
    }
}

pub fn expense(
    id: &str,
    category: &str,
    segregation: Option<&str>,
    amount: f64,
    expense_date: OffsetDateTime,
    created_at: OffsetDateTime,
) -> Expense {
    Expense {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        amount,
        category: category.to_string(),
        segregation: segregation.map(str::to_string),
        description: String::new(),
        expense_date,
        created_at,
    }
}

/// Inserts a well-formed expense document with explicit timestamps.
pub async fn insert_expense(
    store: &Store,
    group_id: &str,
    category: &str,
    segregation: Option<&str>,
    amount: f64,
    expense_date: OffsetDateTime,
    created_at: OffsetDateTime,
) -> String {
    let body = RawExpense {
        user_id: Some("user-1".to_string()),
        amount: Some(amount),
        category: Some(category.to_string()),
        segregation: segregation.map(str::to_string),
        description: Some(format!("{} expense", category)),
        expense_date: Some(RawTimestamp::from_datetime(expense_date)),
        created_at: Some(RawTimestamp::from_datetime(created_at)),
    };
    let value = serde_json::to_value(&body).expect("Failed to encode expense document");
    store
        .insert_expense_document(group_id, &value)
        .await
        .unwrap_or_else(|e| panic!("Failed to insert expense into {}: {}", group_id, e))
}

pub async fn next_update(subscription: &mut Subscription) -> FeedUpdate {
    tokio::time::timeout(FEED_WAIT, subscription.next())
        .await
        .expect("Timed out waiting for feed update")
        .expect("Feed closed unexpectedly")
}

pub async fn next_snapshot(subscription: &mut Subscription) -> Vec<Expense> {
    next_update(subscription)
        .await
        .expect("Feed delivered an error")
}

pub fn ids(expenses: &[Expense]) -> Vec<&str> {
    expenses.iter().map(|e| e.id.as_str()).collect()
}

/// Makes every expense read fail until [`restore_expense_table`] is called.
pub async fn hide_expense_table(store: &Store) {
    let conn = store.db().write().await;
    conn.execute("ALTER TABLE expenses RENAME TO expenses_hidden", ())
        .await
        .expect("Failed to hide expenses table");
}

pub async fn restore_expense_table(store: &Store) {
    let conn = store.db().write().await;
    conn.execute("ALTER TABLE expenses_hidden RENAME TO expenses", ())
        .await
        .expect("Failed to restore expenses table");
}
