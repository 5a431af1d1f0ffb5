use anyhow::Result;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

use crate::constants::DATABASE_FILE;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id             TEXT    PRIMARY KEY,
    name           TEXT    UNIQUE NOT NULL,
    password_hash  TEXT    NOT NULL
);
"#;

// Group documents; membership lives inside the JSON body (`$.users`).
const CREATE_GROUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS groups (
    seq   INTEGER PRIMARY KEY AUTOINCREMENT,
    id    TEXT    UNIQUE NOT NULL,
    body  TEXT    NOT NULL
);
"#;

// groups/{group_id}/expenses/{id}
const CREATE_EXPENSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS expenses (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,
    id        TEXT    UNIQUE NOT NULL,
    group_id  TEXT    NOT NULL,
    body      TEXT    NOT NULL
);
"#;

const CREATE_EXPENSES_GROUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_expenses_group ON expenses (group_id);";

// groups/{group_id}/incomes/{id}
const CREATE_INCOMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS incomes (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,
    id        TEXT    UNIQUE NOT NULL,
    group_id  TEXT    NOT NULL,
    body      TEXT    NOT NULL
);
"#;

const CREATE_INCOMES_GROUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_incomes_group ON incomes (group_id);";

const CREATE_PREFERENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS preferences (
    user_id  TEXT NOT NULL,
    key      TEXT NOT NULL,
    value    TEXT NOT NULL,
    PRIMARY KEY (user_id, key)
);
"#;

const CREATE_PUSH_SUBSCRIPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS push_subscriptions (
    user_id     TEXT    PRIMARY KEY,
    endpoint    TEXT    NOT NULL,
    body        TEXT    NOT NULL,
    updated_at  INTEGER NOT NULL
);
"#;

const CREATE_PUSH_OUTBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS push_outbox (
    id          TEXT    PRIMARY KEY,
    user_id     TEXT    NOT NULL,
    endpoint    TEXT    NOT NULL,
    payload     TEXT    NOT NULL,
    created_at  INTEGER NOT NULL
);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Opens (creating if needed) the shared database under `data_dir`.
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join(DATABASE_FILE);
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    for statement in [
        CREATE_USERS_TABLE,
        CREATE_GROUPS_TABLE,
        CREATE_EXPENSES_TABLE,
        CREATE_EXPENSES_GROUP_INDEX,
        CREATE_INCOMES_TABLE,
        CREATE_INCOMES_GROUP_INDEX,
        CREATE_PREFERENCES_TABLE,
        CREATE_PUSH_SUBSCRIPTIONS_TABLE,
        CREATE_PUSH_OUTBOX_TABLE,
    ] {
        conn.execute(statement, ()).await?;
    }

    log::debug!("database ready at {}", data_dir);
    Ok(Arc::new(RwLock::new(conn)))
}
