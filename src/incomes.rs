//! Group incomes: create-only records next to the expenses of a group.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use time::{OffsetDateTime, UtcOffset};
use tower_sessions::Session;

use crate::AppState;
use crate::auth::get_current_user;
use crate::constants::MAX_SOURCE_LENGTH;
use crate::feed::sort_newest_first_by;
use crate::models::{CreateIncomePayload, Income, NewIncome, RawIncome, RawTimestamp};
use crate::store::{Store, StoreError, normalize_income};
use crate::utils::{
    parse_date_or_datetime, require_member, store_error, validate_amount, validate_string_length,
};

pub fn validate_new_income(
    payload: CreateIncomePayload,
    offset: UtcOffset,
) -> Result<NewIncome, (StatusCode, String)> {
    validate_amount(payload.amount, "Income amount")?;
    validate_string_length(&payload.source, "Source", MAX_SOURCE_LENGTH)?;

    let income_date = match payload.income_date.as_deref() {
        Some(value) => parse_date_or_datetime(value, offset).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Income date must be YYYY-MM-DD or RFC 3339".to_string(),
            )
        })?,
        None => OffsetDateTime::now_utc().to_offset(offset),
    };

    Ok(NewIncome {
        amount: payload.amount,
        source: payload.source.trim().to_string(),
        income_date,
    })
}

pub async fn add_income(
    store: &Store,
    group_id: &str,
    user_id: &str,
    income: NewIncome,
) -> Result<Income, StoreError> {
    let body = RawIncome {
        user_id: Some(user_id.to_string()),
        amount: Some(income.amount),
        source: Some(income.source),
        income_date: Some(RawTimestamp::from_datetime(income.income_date)),
        created_at: Some(RawTimestamp::from_datetime(OffsetDateTime::now_utc())),
    };
    let value = serde_json::to_value(&body)?;
    let id = store.insert_income_document(group_id, &value).await?;

    normalize_income(&id, &value.to_string())
}

/// Incomes of the group, most recently created first.
pub async fn list_incomes(store: &Store, group_id: &str) -> Result<Vec<Income>, StoreError> {
    let mut incomes = store.income_documents(group_id).await?;
    sort_newest_first_by(&mut incomes, |income| income.created_at);
    Ok(incomes)
}

pub async fn create_income(
    State(state): State<AppState>,
    session: Session,
    Path(group_id): Path<String>,
    Json(payload): Json<CreateIncomePayload>,
) -> Result<(StatusCode, Json<Income>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let new_income = validate_new_income(payload, state.utc_offset)?;
    require_member(&state.store, &group_id, &user.id).await?;

    let income = add_income(&state.store, &group_id, &user.id, new_income)
        .await
        .map_err(store_error)?;

    log::info!("user {} added income {} to group {}", user.id, income.id, group_id);
    Ok((StatusCode::CREATED, Json(income)))
}

pub async fn get_incomes(
    State(state): State<AppState>,
    session: Session,
    Path(group_id): Path<String>,
) -> Result<(StatusCode, Json<Vec<Income>>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    require_member(&state.store, &group_id, &user.id).await?;

    let incomes = list_incomes(&state.store, &group_id)
        .await
        .map_err(store_error)?;

    Ok((StatusCode::OK, Json(incomes)))
}
