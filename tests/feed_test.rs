/*!
 * Expense Feed Tests
 *
 * Live subscriptions (initial snapshot, ordering, change delivery,
 * unsubscribe) and the one-shot month read.
 */

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use group_expense_server::feed::{
    Unsubscribe, calendar_month_range, get_expenses_for_month, sort_newest_first, subscribe,
    subscribe_with,
};
use group_expense_server::store::StoreError;
use serde_json::json;
use time::macros::{datetime, offset};
use time::{Month, UtcOffset};
use tokio::sync::mpsc;

#[tokio::test]
async fn snapshot_is_sorted_newest_created_first() {
    let env = setup_test_env().await;
    let store = &env.store;

    // Created at t1 < t2 < t3, with expense dates in the opposite order.
    let t1 = insert_expense(
        store,
        "g",
        "Food",
        None,
        1.0,
        datetime!(2024-05-30 00:00 UTC),
        datetime!(2024-05-01 10:00 UTC),
    )
    .await;
    let t3 = insert_expense(
        store,
        "g",
        "Gift",
        None,
        3.0,
        datetime!(2024-05-01 00:00 UTC),
        datetime!(2024-05-03 10:00 UTC),
    )
    .await;
    let t2 = insert_expense(
        store,
        "g",
        "Travel",
        None,
        2.0,
        datetime!(2024-05-15 00:00 UTC),
        datetime!(2024-05-02 10:00 UTC),
    )
    .await;

    let mut feed = subscribe(store, "g");
    let snapshot = next_snapshot(&mut feed).await;

    assert_eq!(ids(&snapshot), vec![t3.as_str(), t2.as_str(), t1.as_str()]);
    feed.unsubscribe();
}

#[tokio::test]
async fn new_expense_delivers_full_snapshot() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    let first = insert_expense(store, "g", "Food", None, 5.0, day, day).await;
    let mut feed = subscribe(store, "g");
    assert_eq!(next_snapshot(&mut feed).await.len(), 1);

    let second = insert_expense(
        store,
        "g",
        "Food",
        Some("Luxury"),
        7.0,
        day,
        day + time::Duration::minutes(1),
    )
    .await;
    let snapshot = next_snapshot(&mut feed).await;

    assert_eq!(ids(&snapshot), vec![second.as_str(), first.as_str()]);
    assert_eq!(snapshot[0].segregation.as_deref(), Some("Luxury"));
}

#[tokio::test]
async fn writes_to_other_groups_are_not_delivered() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    let mut feed = subscribe(store, "mine");
    assert!(next_snapshot(&mut feed).await.is_empty());

    insert_expense(store, "theirs", "Food", None, 5.0, day, day).await;

    let quiet = tokio::time::timeout(QUIET_WAIT, feed.next()).await;
    assert!(quiet.is_err(), "feed delivered an update for another group");
}

#[tokio::test]
async fn malformed_documents_do_not_break_the_feed() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    let mut feed = subscribe(store, "g");
    next_snapshot(&mut feed).await;

    store
        .insert_expense_document("g", &json!({"category": "Food"}))
        .await
        .expect("insert malformed");
    assert!(next_snapshot(&mut feed).await.is_empty());

    let good = insert_expense(store, "g", "Food", None, 1.0, day, day).await;
    assert_eq!(ids(&next_snapshot(&mut feed).await), vec![good.as_str()]);
}

#[tokio::test]
async fn unsubscribe_stops_delivery_and_is_idempotent() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    let mut feed = subscribe(store, "g");
    next_snapshot(&mut feed).await;
    assert!(feed.is_active());

    feed.unsubscribe();
    feed.unsubscribe();
    assert!(!feed.is_active());

    insert_expense(store, "g", "Food", None, 1.0, day, day).await;
    assert!(feed.next().await.is_none());
}

#[tokio::test]
async fn callback_subscription_stops_after_unsubscribe() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    let (data_tx, mut data_rx) = mpsc::unbounded_channel();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let error_sink = Arc::clone(&errors);

    let handle = subscribe_with(
        store,
        "g",
        move |expenses| {
            let _ = data_tx.send(expenses);
        },
        move |e| error_sink.lock().unwrap().push(e),
    );

    let initial = tokio::time::timeout(FEED_WAIT, data_rx.recv())
        .await
        .expect("initial snapshot")
        .expect("channel open");
    assert!(initial.is_empty());

    insert_expense(store, "g", "Food", None, 1.0, day, day).await;
    let updated = tokio::time::timeout(FEED_WAIT, data_rx.recv())
        .await
        .expect("update")
        .expect("channel open");
    assert_eq!(updated.len(), 1);

    handle.unsubscribe();
    handle.unsubscribe();
    assert!(!handle.is_active());

    insert_expense(store, "g", "Food", None, 2.0, day, day).await;
    tokio::time::sleep(QUIET_WAIT).await;
    assert!(data_rx.try_recv().is_err());
    assert!(errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn month_read_covers_whole_calendar_month() {
    let env = setup_test_env().await;
    let store = &env.store;
    let created = datetime!(2024-03-01 00:00 UTC);

    let start = insert_expense(
        store,
        "g",
        "Food",
        None,
        1.0,
        datetime!(2024-02-01 00:00 UTC),
        created,
    )
    .await;
    let end = insert_expense(
        store,
        "g",
        "Food",
        None,
        2.0,
        datetime!(2024-02-29 23:59 UTC),
        created + time::Duration::hours(1),
    )
    .await;
    insert_expense(
        store,
        "g",
        "Food",
        None,
        4.0,
        datetime!(2024-03-01 00:00 UTC),
        created,
    )
    .await;
    insert_expense(
        store,
        "g",
        "Food",
        None,
        8.0,
        datetime!(2024-01-31 23:59 UTC),
        created,
    )
    .await;

    let february = get_expenses_for_month(store, "g", 2024, Month::February, UtcOffset::UTC)
        .await
        .expect("month read");

    assert_eq!(ids(&february), vec![end.as_str(), start.as_str()]);
}

#[tokio::test]
async fn month_read_uses_requested_offset() {
    let env = setup_test_env().await;
    let store = &env.store;

    // 2024-02-29 20:00 UTC is already March 1st at +05:30.
    let id = insert_expense(
        store,
        "g",
        "Food",
        None,
        1.0,
        datetime!(2024-02-29 20:00 UTC),
        datetime!(2024-02-29 20:00 UTC),
    )
    .await;

    let march = get_expenses_for_month(store, "g", 2024, Month::March, offset!(+05:30))
        .await
        .expect("march read");
    let february = get_expenses_for_month(store, "g", 2024, Month::February, offset!(+05:30))
        .await
        .expect("february read");

    assert_eq!(ids(&march), vec![id.as_str()]);
    assert!(february.is_empty());
}

#[test]
fn sort_keeps_store_order_for_equal_timestamps() {
    let at = datetime!(2024-01-01 00:00 UTC);
    let mut expenses = vec![
        expense("a", "Food", None, 1.0, at, at),
        expense("b", "Food", None, 1.0, at, at + time::Duration::seconds(1)),
        expense("c", "Food", None, 1.0, at, at),
    ];

    sort_newest_first(&mut expenses);

    assert_eq!(ids(&expenses), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn failed_read_is_delivered_and_feed_recovers() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    hide_expense_table(store).await;
    let mut feed = subscribe(store, "g");

    let failed = next_update(&mut feed).await;
    assert!(matches!(failed, Err(StoreError::Unavailable(_))));
    assert!(feed.is_active());

    restore_expense_table(store).await;
    let id = insert_expense(store, "g", "Food", None, 3.0, day, day).await;

    assert_eq!(ids(&next_snapshot(&mut feed).await), vec![id.as_str()]);
}

#[tokio::test]
async fn callback_subscription_reports_errors_then_data() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    let (data_tx, mut data_rx) = mpsc::unbounded_channel();
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();

    hide_expense_table(store).await;
    let handle = subscribe_with(
        store,
        "g",
        move |expenses| {
            let _ = data_tx.send(expenses);
        },
        move |e| {
            let _ = error_tx.send(e);
        },
    );

    let error = tokio::time::timeout(FEED_WAIT, error_rx.recv())
        .await
        .expect("error delivered")
        .expect("channel open");
    assert!(matches!(error, StoreError::Unavailable(_)));

    restore_expense_table(store).await;
    insert_expense(store, "g", "Food", None, 1.0, day, day).await;
    let recovered = tokio::time::timeout(FEED_WAIT, data_rx.recv())
        .await
        .expect("recovery snapshot")
        .expect("channel open");
    assert_eq!(recovered.len(), 1);

    handle.unsubscribe();
}

#[tokio::test]
async fn unsubscribe_from_inside_callback_stops_delivery() {
    let env = setup_test_env().await;
    let store = &env.store;
    let day = datetime!(2024-05-10 09:00 UTC);

    let calls = Arc::new(Mutex::new(0usize));
    let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let counter = Arc::clone(&calls);
    let own_handle = Arc::clone(&slot);
    let handle = subscribe_with(
        store,
        "g",
        move |_expenses| {
            *counter.lock().unwrap() += 1;
            if let Some(handle) = own_handle.lock().unwrap().as_ref() {
                handle.unsubscribe();
            }
            let _ = done_tx.send(());
        },
        |_e| {},
    );
    *slot.lock().unwrap() = Some(handle.clone());

    // The initial snapshot may run before the handle is stored; the next one
    // certainly sees it.
    tokio::time::timeout(FEED_WAIT, done_rx.recv())
        .await
        .expect("first callback")
        .expect("channel open");
    if handle.is_active() {
        insert_expense(store, "g", "Food", None, 1.0, day, day).await;
        tokio::time::timeout(FEED_WAIT, done_rx.recv())
            .await
            .expect("second callback")
            .expect("channel open");
    }
    assert!(!handle.is_active());
    let delivered = *calls.lock().unwrap();

    insert_expense(store, "g", "Food", None, 2.0, day, day).await;
    tokio::time::sleep(QUIET_WAIT).await;
    assert_eq!(*calls.lock().unwrap(), delivered);

    handle.unsubscribe();
}

#[tokio::test]
async fn month_past_the_calendar_end_is_invalid_input() {
    let env = setup_test_env().await;

    let result =
        get_expenses_for_month(&env.store, "g", 9999, Month::December, UtcOffset::UTC).await;
    assert!(matches!(result, Err(StoreError::InvalidInput(_))));

    assert!(matches!(
        calendar_month_range(10_000, Month::January, UtcOffset::UTC),
        Err(StoreError::InvalidInput(_))
    ));

    let (start, end) = calendar_month_range(9999, Month::November, UtcOffset::UTC)
        .expect("November 9999 is representable");
    assert_eq!(start, datetime!(9999-11-01 00:00 UTC));
    assert_eq!(end, datetime!(9999-12-01 00:00 UTC));
}
