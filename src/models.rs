use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
}

#[derive(Deserialize, Debug)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

/// A normalised expense record. Immutable once stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub category: String,
    pub segregation: Option<String>,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expense_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMeta {
    pub id: String,
    pub name: String,
    pub users: Vec<String>,
    pub admins: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl GroupMeta {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}

/// Validated input for a new expense; `createdAt` and `id` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub amount: f64,
    pub category: String,
    pub segregation: Option<String>,
    pub description: String,
    pub expense_date: OffsetDateTime,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpensePayload {
    pub amount: f64,
    pub category: String,
    pub segregation: Option<String>,
    pub description: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    pub expense_date: Option<String>,
}

/// Money received by a group member. Immutable once stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub income_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewIncome {
    pub amount: f64,
    pub source: String,
    pub income_date: OffsetDateTime,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncomePayload {
    pub amount: f64,
    pub source: String,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    pub income_date: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateGroupPayload {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct ListExpensesQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize, Debug)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u8,
}

#[derive(Deserialize, Debug)]
pub struct SummaryQuery {
    pub date: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    pub group_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Browser push endpoint descriptor, as produced by `PushSubscription.toJSON()`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: PushKeys,
}

#[derive(Deserialize, Debug)]
pub struct SendNotificationPayload {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedGroup {
    pub group_id: Option<String>,
}

/// Timestamp as found in stored documents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Store-native representation.
    Native { seconds: i64, nanoseconds: u32 },
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    pub fn from_datetime(value: OffsetDateTime) -> Self {
        RawTimestamp::Native {
            seconds: value.unix_timestamp(),
            nanoseconds: value.nanosecond(),
        }
    }

    pub fn to_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            RawTimestamp::Native {
                seconds,
                nanoseconds,
            } => {
                if *nanoseconds >= 1_000_000_000 {
                    return None;
                }
                OffsetDateTime::from_unix_timestamp(*seconds)
                    .ok()?
                    .checked_add(Duration::nanoseconds(i64::from(*nanoseconds)))
            }
            RawTimestamp::Millis(millis) => {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(*millis) * 1_000_000).ok()
            }
            RawTimestamp::Text(text) => OffsetDateTime::parse(text, &Rfc3339).ok(),
        }
    }
}

/// Expense document body with every field optional; see `store::normalize_expense`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawExpense {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segregation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expense_date: Option<RawTimestamp>,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawGroup {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}

/// Income document body; see `store::normalize_income`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawIncome {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub income_date: Option<RawTimestamp>,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}
