use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use tower_sessions::Session;

use crate::AppState;
use crate::auth::get_current_user;
use crate::models::LiveQuery;
use crate::tracker::{DashboardView, Tracker, TrackerEvent};
use crate::utils::{reference_date, store_error};

fn snapshot_event(view: &DashboardView) -> Event {
    Event::default()
        .event("snapshot")
        .json_data(view)
        .unwrap_or_else(|e| {
            log::error!("failed to encode dashboard view: {}", e);
            Event::default().event("error").data("Failed to encode update")
        })
}

/// Server-sent events carrying the dashboard of the selected group: a
/// `snapshot` event per feed update and an `error` event per failed read.
pub async fn live_dashboard(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LiveQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let date = reference_date(query.date.as_deref(), state.utc_offset)?;

    let mut tracker = Tracker::start(
        state.store.clone(),
        state.preferences.clone(),
        &user.id,
        date,
    )
    .await
    .map_err(store_error)?;

    if let Some(group_id) = query.group_id.as_deref() {
        if !tracker.select_group(group_id).await.map_err(store_error)? {
            return Err((StatusCode::NOT_FOUND, "Group not found".to_string()));
        }
    }

    log::info!("live dashboard opened for user {}", user.id);
    let updates = stream::unfold(tracker, |mut tracker| async move {
        let event = match tracker.next_update().await? {
            TrackerEvent::Updated => snapshot_event(&tracker.view()),
            TrackerEvent::Notice(message) => Event::default().event("error").data(message),
        };
        Some((Ok(event), tracker))
    });

    Ok(Sse::new(updates).keep_alive(KeepAlive::default()))
}
