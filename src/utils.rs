use axum::http::StatusCode;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::aggregator::first_of_next_month;
use crate::constants::*;
use crate::models::GroupMeta;
use crate::store::{Store, StoreError};

pub fn db_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ERR_DATABASE_OPERATION.to_string(),
    )
}

pub fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::NotFound(what) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)),
        StoreError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        StoreError::Unavailable(msg) => {
            log::error!("store unavailable: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ERR_DATABASE_ACCESS.to_string(),
            )
        }
        StoreError::Malformed { id, reason } => {
            log::error!("malformed document {}: {}", id, reason);
            db_error()
        }
    }
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be empty", field_name),
        ));
    }
    validate_max_length(value, field_name, max_length)
}

pub fn validate_max_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.len() > max_length {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} must be less than {} characters", field_name, max_length),
        ));
    }
    Ok(())
}

/// Finite and non-negative.
pub fn validate_amount(amount: f64, field_name: &str) -> Result<(), (StatusCode, String)> {
    if !amount.is_finite() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} must be a number", field_name),
        ));
    }
    if amount < 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be negative", field_name),
        ));
    }
    Ok(())
}

/// Loads the group and checks that `user_id` belongs to it.
pub async fn require_member(
    store: &Store,
    group_id: &str,
    user_id: &str,
) -> Result<GroupMeta, (StatusCode, String)> {
    let group = store
        .get_group(group_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Group not found".to_string()))?;

    if !group.has_member(user_id) {
        return Err((
            StatusCode::FORBIDDEN,
            "Not a member of this group".to_string(),
        ));
    }
    Ok(group)
}

pub fn parse_calendar_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).ok()
}

/// Accepts RFC 3339 or `YYYY-MM-DD` (midnight in `offset`).
pub fn parse_date_or_datetime(value: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    if let Ok(datetime) = OffsetDateTime::parse(value.trim(), &Rfc3339) {
        return datetime.checked_to_offset(offset);
    }
    parse_calendar_date(value)
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(offset))
}

/// Reference date for aggregation; defaults to now.
///
/// The month after the reference date must be representable so the month
/// read for it has an end bound.
pub fn reference_date(
    value: Option<&str>,
    offset: UtcOffset,
) -> Result<OffsetDateTime, (StatusCode, String)> {
    let date = match value {
        Some(value) => parse_date_or_datetime(value, offset).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Date must be YYYY-MM-DD or RFC 3339".to_string(),
            )
        })?,
        None => OffsetDateTime::now_utc().to_offset(offset),
    };

    if first_of_next_month(date.date()).is_none() {
        return Err((StatusCode::BAD_REQUEST, "Date is out of range".to_string()));
    }
    Ok(date)
}
