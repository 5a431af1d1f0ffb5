/*!
 * Tracker Tests
 *
 * Session lifecycle: initial group selection, restoring the stored
 * selection, switching groups without leaking the old feed, date changes
 * and stale month responses.
 */

mod common;

use common::*;
use group_expense_server::constants::{
    ERR_FEED_UNAVAILABLE, PERSONAL_GROUP_NAME, SELECTED_GROUP_KEY,
};
use group_expense_server::groups::create_group;
use group_expense_server::store::StoreError;
use group_expense_server::tracker::{Tracker, TrackerEvent};
use time::macros::datetime;

async fn next_event(tracker: &mut Tracker) -> TrackerEvent {
    tokio::time::timeout(FEED_WAIT, tracker.next_update())
        .await
        .expect("Timed out waiting for tracker update")
        .expect("Tracker feed closed")
}

#[tokio::test]
async fn start_selects_and_persists_personal_group() {
    let env = setup_test_env().await;

    let mut tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(2024-05-10 12:00 UTC),
    )
    .await
    .expect("start tracker");

    let selected = tracker.selected_group().expect("a group is selected").clone();
    assert_eq!(selected.name, PERSONAL_GROUP_NAME);
    assert_eq!(tracker.groups().len(), 1);

    let stored = env
        .preferences
        .get("alice", SELECTED_GROUP_KEY)
        .await
        .expect("read preference");
    assert_eq!(stored, Some(selected.id.clone()));

    assert_eq!(next_event(&mut tracker).await, TrackerEvent::Updated);
    assert!(tracker.expenses().is_empty());
    tracker.shutdown();
}

#[tokio::test]
async fn start_restores_stored_selection() {
    let env = setup_test_env().await;
    let first = create_group(&env.store, "Home", &[], "alice")
        .await
        .expect("create home");
    let second = create_group(&env.store, "Trip", &[], "alice")
        .await
        .expect("create trip");
    env.preferences
        .set_selected_group_id("alice", &second)
        .await
        .expect("store selection");

    let tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(2024-05-10 12:00 UTC),
    )
    .await
    .expect("start tracker");

    assert_eq!(tracker.groups().len(), 2);
    assert_eq!(tracker.selected_group().map(|g| g.id.clone()), Some(second));
    assert_ne!(tracker.selected_group().map(|g| g.id.clone()), Some(first));
}

#[tokio::test]
async fn stale_stored_selection_falls_back_to_first_group() {
    let env = setup_test_env().await;
    let home = create_group(&env.store, "Home", &[], "alice")
        .await
        .expect("create home");
    env.preferences
        .set_selected_group_id("alice", "deleted-group")
        .await
        .expect("store selection");

    let tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(2024-05-10 12:00 UTC),
    )
    .await
    .expect("start tracker");

    assert_eq!(tracker.selected_group().map(|g| g.id.clone()), Some(home));
}

#[tokio::test]
async fn switching_groups_ignores_the_previous_group() {
    let env = setup_test_env().await;
    let day = datetime!(2024-05-10 12:00 UTC);
    let home = create_group(&env.store, "Home", &[], "alice")
        .await
        .expect("create home");
    let trip = create_group(&env.store, "Trip", &[], "alice")
        .await
        .expect("create trip");
    insert_expense(&env.store, &home, "Food", None, 10.0, day, day).await;
    insert_expense(&env.store, &trip, "Travel", None, 300.0, day, day).await;

    let mut tracker = Tracker::start(env.store.clone(), env.preferences.clone(), "alice", day)
        .await
        .expect("start tracker");
    assert_eq!(tracker.selected_group().map(|g| g.id.clone()), Some(home.clone()));
    next_event(&mut tracker).await;
    assert_eq!(tracker.aggregates().daily_total, 10.0);

    assert!(tracker.select_group(&trip).await.expect("switch"));
    assert!(tracker.expenses().is_empty());
    next_event(&mut tracker).await;
    assert_eq!(tracker.aggregates().daily_total, 300.0);

    // Writes to the old group must not reach the tracker any more.
    insert_expense(&env.store, &home, "Food", None, 1000.0, day, day).await;
    let quiet = tokio::time::timeout(QUIET_WAIT, tracker.next_update()).await;
    assert!(quiet.is_err());
    assert_eq!(tracker.aggregates().daily_total, 300.0);

    let stored = env
        .preferences
        .selected_group_id("alice")
        .await
        .expect("read preference");
    assert_eq!(stored, Some(trip));
}

#[tokio::test]
async fn selecting_unknown_group_keeps_current_selection() {
    let env = setup_test_env().await;

    let mut tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(2024-05-10 12:00 UTC),
    )
    .await
    .expect("start tracker");
    let before = tracker.selected_group().map(|g| g.id.clone());

    assert!(!tracker.select_group("someone-elses").await.expect("select"));
    assert_eq!(tracker.selected_group().map(|g| g.id.clone()), before);
}

#[tokio::test]
async fn changing_date_recomputes_from_snapshot() {
    let env = setup_test_env().await;
    let created = datetime!(2024-05-20 12:00 UTC);
    let home = create_group(&env.store, "Home", &[], "alice")
        .await
        .expect("create home");
    insert_expense(
        &env.store,
        &home,
        "Food",
        Some("Essential"),
        10.0,
        datetime!(2024-05-10 08:00 UTC),
        created,
    )
    .await;
    insert_expense(
        &env.store,
        &home,
        "Food",
        None,
        5.0,
        datetime!(2024-05-11 08:00 UTC),
        created,
    )
    .await;

    let mut tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(2024-05-10 12:00 UTC),
    )
    .await
    .expect("start tracker");
    next_event(&mut tracker).await;

    assert_eq!(tracker.aggregates().daily_total, 10.0);
    assert_eq!(
        tracker.aggregates().daily_summary.get("Essential - Food"),
        Some(10.0)
    );
    assert_eq!(tracker.aggregates().monthly_total, 15.0);

    tracker.set_date(datetime!(2024-05-11 12:00 UTC));
    assert_eq!(tracker.aggregates().daily_total, 5.0);
    assert_eq!(tracker.aggregates().daily_summary.get("Food"), Some(5.0));

    let view = tracker.view();
    assert_eq!(view.monthly_chart_series.len(), 1);
    assert_eq!(view.monthly_chart_series[0].value, 15.0);
}

#[tokio::test]
async fn stale_month_responses_are_discarded() {
    let env = setup_test_env().await;
    let home = create_group(&env.store, "Home", &[], "alice")
        .await
        .expect("create home");
    create_group(&env.store, "Trip", &[], "alice")
        .await
        .expect("create trip");

    let mut tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(2024-05-10 12:00 UTC),
    )
    .await
    .expect("start tracker");

    let may = tracker.begin_month_request().expect("request for May");
    tracker.set_date(datetime!(2024-06-02 12:00 UTC));
    let june = tracker.begin_month_request().expect("request for June");

    assert!(tracker.accept_month(&may, Vec::new()).is_none());
    assert!(tracker.accept_month(&june, Vec::new()).is_some());

    // A group switch invalidates the pending request too.
    let trip = tracker
        .groups()
        .iter()
        .find(|g| g.id != home)
        .map(|g| g.id.clone())
        .expect("second group");
    let pending = tracker.begin_month_request().expect("pending request");
    tracker.select_group(&trip).await.expect("switch");
    assert!(tracker.accept_month(&pending, Vec::new()).is_none());
}

#[tokio::test]
async fn month_expenses_reads_selected_month() {
    let env = setup_test_env().await;
    let home = create_group(&env.store, "Home", &[], "alice")
        .await
        .expect("create home");
    let may_id = insert_expense(
        &env.store,
        &home,
        "Food",
        None,
        1.0,
        datetime!(2024-05-31 23:00 UTC),
        datetime!(2024-05-31 23:00 UTC),
    )
    .await;
    insert_expense(
        &env.store,
        &home,
        "Food",
        None,
        1.0,
        datetime!(2024-06-01 00:00 UTC),
        datetime!(2024-06-01 00:00 UTC),
    )
    .await;

    let mut tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(2024-05-10 12:00 UTC),
    )
    .await
    .expect("start tracker");

    let may = tracker
        .month_expenses()
        .await
        .expect("month read")
        .expect("current request");
    assert_eq!(ids(&may), vec![may_id.as_str()]);
}

#[tokio::test]
async fn recent_transactions_preview_shows_three() {
    let env = setup_test_env().await;
    let home = create_group(&env.store, "Home", &[], "alice")
        .await
        .expect("create home");
    let day = datetime!(2024-05-10 12:00 UTC);
    for minute in 0..5 {
        insert_expense(
            &env.store,
            &home,
            "Food",
            None,
            1.0,
            day,
            day + time::Duration::minutes(minute),
        )
        .await;
    }

    let mut tracker = Tracker::start(env.store.clone(), env.preferences.clone(), "alice", day)
        .await
        .expect("start tracker");
    next_event(&mut tracker).await;

    assert_eq!(tracker.recent_transactions(false).len(), 3);
    assert_eq!(tracker.recent_transactions(true).len(), 5);
    assert_eq!(
        tracker.recent_transactions(false)[0].created_at,
        day + time::Duration::minutes(4)
    );
}

#[tokio::test]
async fn failed_feed_read_becomes_a_notice_then_recovers() {
    let env = setup_test_env().await;
    let day = datetime!(2024-05-10 12:00 UTC);

    hide_expense_table(&env.store).await;
    let mut tracker = Tracker::start(env.store.clone(), env.preferences.clone(), "alice", day)
        .await
        .expect("start tracker");
    let group_id = tracker.selected_group().expect("selected").id.clone();

    assert_eq!(
        next_event(&mut tracker).await,
        TrackerEvent::Notice(ERR_FEED_UNAVAILABLE.to_string())
    );
    assert!(tracker.expenses().is_empty());

    restore_expense_table(&env.store).await;
    insert_expense(&env.store, &group_id, "Food", None, 8.0, day, day).await;

    assert_eq!(next_event(&mut tracker).await, TrackerEvent::Updated);
    assert_eq!(tracker.aggregates().daily_total, 8.0);
}

#[tokio::test]
async fn month_read_past_the_calendar_end_is_rejected() {
    let env = setup_test_env().await;

    let mut tracker = Tracker::start(
        env.store.clone(),
        env.preferences.clone(),
        "alice",
        datetime!(9999-12-31 12:00 UTC),
    )
    .await
    .expect("start tracker");

    let result = tracker.month_expenses().await;
    assert!(matches!(result, Err(StoreError::InvalidInput(_))));
}
