//! Per-user key-value strings, e.g. the last selected group.

use axum::{Json, extract::State, http::StatusCode};
use tower_sessions::Session;

use crate::AppState;
use crate::auth::get_current_user;
use crate::constants::SELECTED_GROUP_KEY;
use crate::database::Db;
use crate::groups::list_groups;
use crate::models::SelectedGroup;
use crate::store::StoreError;
use crate::utils::store_error;

#[derive(Clone)]
pub struct Preferences {
    db: Db,
}

impl Preferences {
    pub fn new(db: Db) -> Self {
        Preferences { db }
    }

    pub async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query(
                "SELECT value FROM preferences WHERE user_id = ? AND key = ?",
                (user_id, key),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, user_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.db.write().await;
        conn.execute(
            "INSERT INTO preferences (user_id, key, value) VALUES (?, ?, ?) \
             ON CONFLICT (user_id, key) DO UPDATE SET value = excluded.value",
            (user_id, key, value),
        )
        .await?;
        Ok(())
    }

    pub async fn remove(&self, user_id: &str, key: &str) -> Result<(), StoreError> {
        let conn = self.db.write().await;
        conn.execute(
            "DELETE FROM preferences WHERE user_id = ? AND key = ?",
            (user_id, key),
        )
        .await?;
        Ok(())
    }

    pub async fn selected_group_id(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        self.get(user_id, SELECTED_GROUP_KEY).await
    }

    pub async fn set_selected_group_id(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), StoreError> {
        self.set(user_id, SELECTED_GROUP_KEY, group_id).await
    }
}

pub async fn get_selected_group(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<SelectedGroup>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let group_id = state
        .preferences
        .selected_group_id(&user.id)
        .await
        .map_err(store_error)?;

    Ok((StatusCode::OK, Json(SelectedGroup { group_id })))
}

pub async fn put_selected_group(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<SelectedGroup>,
) -> Result<(StatusCode, Json<SelectedGroup>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let group_id = payload
        .group_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "group_id is required".to_string()))?;

    let groups = list_groups(&state.store, &user.id)
        .await
        .map_err(store_error)?;
    if !groups.iter().any(|g| g.id == group_id) {
        return Err((StatusCode::NOT_FOUND, "Group not found".to_string()));
    }

    state
        .preferences
        .set_selected_group_id(&user.id, &group_id)
        .await
        .map_err(store_error)?;

    Ok((
        StatusCode::OK,
        Json(SelectedGroup {
            group_id: Some(group_id),
        }),
    ))
}

pub async fn delete_selected_group(
    State(state): State<AppState>,
    session: Session,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    state
        .preferences
        .remove(&user.id, SELECTED_GROUP_KEY)
        .await
        .map_err(store_error)?;

    Ok(StatusCode::NO_CONTENT)
}
