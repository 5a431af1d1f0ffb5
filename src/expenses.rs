use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use time::{Month, OffsetDateTime, UtcOffset};
use tower_sessions::Session;

use crate::AppState;
use crate::aggregator::{Aggregates, ChartPoint, aggregate};
use crate::auth::get_current_user;
use crate::constants::*;
use crate::feed::{get_expenses_for_month, load_snapshot};
use crate::models::{
    CreateExpensePayload, Expense, ListExpensesQuery, MonthQuery, NewExpense, RawExpense,
    RawTimestamp, SummaryQuery,
};
use crate::store::{Store, StoreError, normalize_expense};
use crate::utils::{
    parse_date_or_datetime, reference_date, require_member, store_error, validate_amount,
    validate_max_length, validate_string_length,
};

pub fn validate_expense_amount(amount: f64) -> Result<(), (StatusCode, String)> {
    validate_amount(amount, "Expense amount")
}

pub fn validate_category(category: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(category, "Category", MAX_CATEGORY_LENGTH)
}

/// Checks a create payload and turns it into a [`NewExpense`].
pub fn validate_new_expense(
    payload: CreateExpensePayload,
    offset: UtcOffset,
) -> Result<NewExpense, (StatusCode, String)> {
    validate_expense_amount(payload.amount)?;
    validate_category(&payload.category)?;

    let segregation = payload
        .segregation
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(segregation) = &segregation {
        validate_max_length(segregation, "Segregation", MAX_SEGREGATION_LENGTH)?;
    }

    let description = payload.description.unwrap_or_default().trim().to_string();
    validate_max_length(&description, "Description", MAX_DESCRIPTION_LENGTH)?;

    let expense_date = match payload.expense_date.as_deref() {
        Some(value) => parse_date_or_datetime(value, offset).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Expense date must be YYYY-MM-DD or RFC 3339".to_string(),
            )
        })?,
        None => OffsetDateTime::now_utc().to_offset(offset),
    };

    Ok(NewExpense {
        amount: payload.amount,
        category: payload.category.trim().to_string(),
        segregation,
        description,
        expense_date,
    })
}

/// Stores an expense in the group; `createdAt` comes from the server clock.
pub async fn add_expense(
    store: &Store,
    group_id: &str,
    user_id: &str,
    expense: NewExpense,
) -> Result<Expense, StoreError> {
    let body = RawExpense {
        user_id: Some(user_id.to_string()),
        amount: Some(expense.amount),
        category: Some(expense.category),
        segregation: expense.segregation,
        description: Some(expense.description),
        expense_date: Some(RawTimestamp::from_datetime(expense.expense_date)),
        created_at: Some(RawTimestamp::from_datetime(OffsetDateTime::now_utc())),
    };
    let value = serde_json::to_value(&body)?;
    let id = store.insert_expense_document(group_id, &value).await?;

    normalize_expense(&id, &value.to_string())
}

pub async fn create_expense(
    State(state): State<AppState>,
    session: Session,
    Path(group_id): Path<String>,
    Json(payload): Json<CreateExpensePayload>,
) -> Result<(StatusCode, Json<Expense>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let new_expense = validate_new_expense(payload, state.utc_offset)?;
    require_member(&state.store, &group_id, &user.id).await?;

    let expense = add_expense(&state.store, &group_id, &user.id, new_expense)
        .await
        .map_err(store_error)?;

    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn get_expenses(
    State(state): State<AppState>,
    session: Session,
    Path(group_id): Path<String>,
    Query(query): Query<ListExpensesQuery>,
) -> Result<(StatusCode, Json<Vec<Expense>>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    require_member(&state.store, &group_id, &user.id).await?;

    let mut expenses = load_snapshot(&state.store, &group_id)
        .await
        .map_err(store_error)?;
    if let Some(limit) = query.limit {
        expenses.truncate(limit);
    }

    Ok((StatusCode::OK, Json(expenses)))
}

pub async fn get_month_expenses(
    State(state): State<AppState>,
    session: Session,
    Path(group_id): Path<String>,
    Query(query): Query<MonthQuery>,
) -> Result<(StatusCode, Json<Vec<Expense>>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let month = Month::try_from(query.month).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "Month must be between 1 and 12".to_string(),
        )
    })?;
    require_member(&state.store, &group_id, &user.id).await?;

    let expenses = get_expenses_for_month(
        &state.store,
        &group_id,
        query.year,
        month,
        state.utc_offset,
    )
    .await
    .map_err(store_error)?;

    Ok((StatusCode::OK, Json(expenses)))
}

#[derive(serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub reference_date: OffsetDateTime,
    #[serde(flatten)]
    pub aggregates: Aggregates,
    pub monthly_chart_series: Vec<ChartPoint>,
}

pub async fn get_summary(
    State(state): State<AppState>,
    session: Session,
    Path(group_id): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Result<(StatusCode, Json<SummaryResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let reference = reference_date(query.date.as_deref(), state.utc_offset)?;
    require_member(&state.store, &group_id, &user.id).await?;

    let expenses = load_snapshot(&state.store, &group_id)
        .await
        .map_err(store_error)?;
    let aggregates = aggregate(&expenses, reference);

    Ok((
        StatusCode::OK,
        Json(SummaryResponse {
            reference_date: reference,
            monthly_chart_series: aggregates.monthly_chart_series(),
            aggregates,
        }),
    ))
}
