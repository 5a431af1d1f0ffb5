//! Push subscriptions and the notification outbox.
//!
//! Sending does not talk to a push service directly: the payload is queued in
//! `push_outbox` together with the endpoint, and an external web-push
//! dispatcher delivers it.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::auth::get_current_user;
use crate::constants::*;
use crate::database::Db;
use crate::models::{PushSubscription, SendNotificationPayload};
use crate::utils::validate_string_length;

#[derive(Debug)]
pub enum PushError {
    NoSubscription(String),
    Storage(String),
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::NoSubscription(user_id) => {
                write!(f, "No subscription available for user {}", user_id)
            }
            PushError::Storage(msg) => write!(f, "Push storage error: {}", msg),
        }
    }
}

impl std::error::Error for PushError {}

impl From<libsql::Error> for PushError {
    fn from(e: libsql::Error) -> Self {
        PushError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for PushError {
    fn from(e: serde_json::Error) -> Self {
        PushError::Storage(e.to_string())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedNotification {
    pub id: String,
    pub endpoint: String,
    pub payload: String,
}

#[derive(Clone)]
pub struct PushService {
    db: Db,
}

impl PushService {
    pub fn new(db: Db) -> Self {
        PushService { db }
    }

    /// Replaces any earlier subscription of the user.
    pub async fn save_subscription(
        &self,
        user_id: &str,
        subscription: &PushSubscription,
    ) -> Result<(), PushError> {
        let body = serde_json::to_string(subscription)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let conn = self.db.write().await;
        conn.execute(
            "INSERT INTO push_subscriptions (user_id, endpoint, body, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET endpoint = excluded.endpoint, \
             body = excluded.body, updated_at = excluded.updated_at",
            (user_id, subscription.endpoint.as_str(), body.as_str(), now),
        )
        .await?;
        Ok(())
    }

    /// Returns whether a subscription existed.
    pub async fn remove_subscription(&self, user_id: &str) -> Result<bool, PushError> {
        let conn = self.db.write().await;
        let removed = conn
            .execute("DELETE FROM push_subscriptions WHERE user_id = ?", [user_id])
            .await?;
        Ok(removed > 0)
    }

    pub async fn subscription(&self, user_id: &str) -> Result<Option<PushSubscription>, PushError> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query(
                "SELECT body FROM push_subscriptions WHERE user_id = ?",
                [user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// Queues `message` for the user's last saved endpoint.
    pub async fn send_notification(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<QueuedNotification, PushError> {
        let subscription = self
            .subscription(user_id)
            .await?
            .ok_or_else(|| PushError::NoSubscription(user_id.to_string()))?;

        let payload = serde_json::to_string(&NotificationPayload {
            title: PUSH_NOTIFICATION_TITLE.to_string(),
            body: message.to_string(),
            icon: PUSH_NOTIFICATION_ICON.to_string(),
        })?;
        let id = Uuid::new_v4().to_string();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let conn = self.db.write().await;
        conn.execute(
            "INSERT INTO push_outbox (id, user_id, endpoint, payload, created_at) VALUES (?, ?, ?, ?, ?)",
            (
                id.as_str(),
                user_id,
                subscription.endpoint.as_str(),
                payload.as_str(),
                now,
            ),
        )
        .await?;

        log::info!("queued push notification {} for user {}", id, user_id);
        Ok(QueuedNotification {
            id,
            endpoint: subscription.endpoint,
            payload,
        })
    }

    /// Queued notifications for a user, oldest first.
    pub async fn outbox(&self, user_id: &str) -> Result<Vec<QueuedNotification>, PushError> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query(
                "SELECT id, endpoint, payload FROM push_outbox WHERE user_id = ? ORDER BY rowid",
                [user_id],
            )
            .await?;

        let mut queued = Vec::new();
        while let Some(row) = rows.next().await? {
            queued.push(QueuedNotification {
                id: row.get(0)?,
                endpoint: row.get(1)?,
                payload: row.get(2)?,
            });
        }
        Ok(queued)
    }
}

fn push_error(e: PushError) -> (StatusCode, String) {
    match e {
        PushError::NoSubscription(_) => (StatusCode::NOT_FOUND, e.to_string()),
        PushError::Storage(msg) => {
            log::error!("push storage failed: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ERR_DATABASE_OPERATION.to_string(),
            )
        }
    }
}

pub async fn subscribe_user(
    State(state): State<AppState>,
    session: Session,
    Json(subscription): Json<PushSubscription>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    validate_string_length(&subscription.endpoint, "Endpoint", MAX_ENDPOINT_LENGTH)?;

    state
        .push
        .save_subscription(&user.id, &subscription)
        .await
        .map_err(push_error)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unsubscribe_user(
    State(state): State<AppState>,
    session: Session,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    state
        .push
        .remove_subscription(&user.id)
        .await
        .map_err(push_error)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Debug)]
pub struct SendResponse {
    pub success: bool,
    pub id: String,
}

pub async fn send_notification(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<SendNotificationPayload>,
) -> Result<(StatusCode, Json<SendResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    validate_string_length(&payload.message, "Message", MAX_PUSH_MESSAGE_LENGTH)?;

    let queued = state
        .push
        .send_notification(&user.id, payload.message.trim())
        .await
        .map_err(push_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendResponse {
            success: true,
            id: queued.id,
        }),
    ))
}
