use axum::{Json, extract::State, http::StatusCode};
use time::OffsetDateTime;
use tower_sessions::Session;

use crate::AppState;
use crate::auth::get_current_user;
use crate::constants::*;
use crate::models::{CreateGroupPayload, GroupMeta, RawGroup, RawTimestamp};
use crate::store::{Store, StoreError};
use crate::utils::{store_error, validate_string_length};

/// Groups the user belongs to, in store order.
///
/// A user without any group gets a personal group created first, so the
/// result is never empty. Concurrent first loads create only one.
pub async fn list_groups(store: &Store, user_id: &str) -> Result<Vec<GroupMeta>, StoreError> {
    let groups = store.groups_containing(user_id).await?;
    if !groups.is_empty() {
        return Ok(groups);
    }

    let body = group_body(PERSONAL_GROUP_NAME, &[user_id.to_string()], user_id);
    if let Some(id) = store
        .insert_group_unless_member(user_id, &serde_json::to_value(&body)?)
        .await?
    {
        log::info!("provisioned personal group {} for user {}", id, user_id);
    }

    let groups = store.groups_containing(user_id).await?;
    if groups.is_empty() {
        return Err(StoreError::NotFound(format!("groups of user {}", user_id)));
    }
    Ok(groups)
}

/// Creator first, then the other members without duplicates.
pub fn group_members(members: &[String], creator_id: &str) -> Vec<String> {
    let mut users = vec![creator_id.to_string()];
    for member in members {
        let member = member.trim();
        if !member.is_empty() && !users.iter().any(|u| u == member) {
            users.push(member.to_string());
        }
    }
    users
}

/// Stores a new group and returns its id. Only the creator is an admin.
pub async fn create_group(
    store: &Store,
    name: &str,
    members: &[String],
    creator_id: &str,
) -> Result<String, StoreError> {
    let body = group_body(name, members, creator_id);
    store
        .insert_group_document(&serde_json::to_value(&body)?)
        .await
}

fn group_body(name: &str, members: &[String], creator_id: &str) -> RawGroup {
    RawGroup {
        name: Some(name.trim().to_string()),
        users: group_members(members, creator_id),
        admins: vec![creator_id.to_string()],
        created_at: Some(RawTimestamp::from_datetime(OffsetDateTime::now_utc())),
    }
}

pub async fn get_groups(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<GroupMeta>>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let groups = list_groups(&state.store, &user.id)
        .await
        .map_err(store_error)?;

    Ok((StatusCode::OK, Json(groups)))
}

pub async fn post_group(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateGroupPayload>,
) -> Result<(StatusCode, Json<GroupMeta>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    validate_string_length(&payload.name, "Group name", MAX_GROUP_NAME_LENGTH)?;

    let id = create_group(&state.store, &payload.name, &payload.members, &user.id)
        .await
        .map_err(store_error)?;
    let group = state
        .store
        .get_group(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| (StatusCode::INTERNAL_SERVER_ERROR, "Group vanished".to_string()))?;

    log::info!("user {} created group {}", user.id, group.id);
    Ok((StatusCode::CREATED, Json(group)))
}
