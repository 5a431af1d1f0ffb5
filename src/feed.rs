//! Live view of one group's expenses.
//!
//! A subscription owns a background task that waits for change notifications
//! from the [`Store`], re-reads the whole collection and hands a full sorted
//! snapshot to the subscriber. Read failures are delivered as `Err` items and
//! the task keeps listening.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::aggregator::first_of_next_month;
use crate::constants::FEED_SNAPSHOT_BUFFER;
use crate::models::Expense;
use crate::store::{Store, StoreError};

pub type FeedUpdate = Result<Vec<Expense>, StoreError>;

/// Most recently created first. Stable, so equal timestamps keep store order.
pub fn sort_newest_first(expenses: &mut [Expense]) {
    sort_newest_first_by(expenses, |expense| expense.created_at);
}

pub fn sort_newest_first_by<T>(items: &mut [T], created_at: impl Fn(&T) -> OffsetDateTime) {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

pub async fn load_snapshot(store: &Store, group_id: &str) -> FeedUpdate {
    let mut expenses = store.expense_documents(group_id).await?;
    sort_newest_first(&mut expenses);
    Ok(expenses)
}

pub struct Subscription {
    group_id: String,
    receiver: mpsc::Receiver<FeedUpdate>,
    task: Option<JoinHandle<()>>,
}

/// Opens a live feed on `group_id`. The first item is the initial snapshot.
pub fn subscribe(store: &Store, group_id: &str) -> Subscription {
    // Register for changes before the initial read so no write slips between.
    let changes = store.watch();
    let (sender, receiver) = mpsc::channel(FEED_SNAPSHOT_BUFFER);
    let task = tokio::spawn(run_feed(
        store.clone(),
        group_id.to_string(),
        changes,
        sender,
    ));

    log::debug!("opened expense feed for group {}", group_id);
    Subscription {
        group_id: group_id.to_string(),
        receiver,
        task: Some(task),
    }
}

async fn run_feed(
    store: Store,
    group_id: String,
    mut changes: broadcast::Receiver<String>,
    sender: mpsc::Sender<FeedUpdate>,
) {
    loop {
        let update = load_snapshot(&store, &group_id).await;
        if let Err(e) = &update {
            log::warn!("expense feed for group {} failed to read: {}", group_id, e);
        }
        if sender.send(update).await.is_err() {
            return;
        }

        loop {
            match changes.recv().await {
                Ok(changed) if changed == group_id => break,
                Ok(_) => continue,
                // Missed notifications are covered by the next full re-read.
                Err(broadcast::error::RecvError::Lagged(_)) => break,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

impl Subscription {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Next snapshot, or `None` once unsubscribed.
    pub async fn next(&mut self) -> Option<FeedUpdate> {
        if self.task.is_none() {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.receiver.close();
            log::debug!("closed expense feed for group {}", self.group_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

tokio::task_local! {
    // Identity of the gate whose callback is running on this task.
    static RUNNING_GATE: usize;
}

/// Delivery state shared between a callback subscription and its handle.
struct CallbackGate {
    active: AtomicBool,
    // Held while a callback runs so `unsubscribe` can wait for it.
    delivering: Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CallbackGate {
    fn id(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}

/// Handle returned by [`subscribe_with`].
#[derive(Clone)]
pub struct Unsubscribe {
    gate: Arc<CallbackGate>,
}

impl Unsubscribe {
    /// Stops delivery. Once this returns no callback runs again.
    ///
    /// Called from outside, it waits for a callback that is already running.
    /// Called from inside `on_data` or `on_error`, it returns at once and the
    /// delivery loop stops after that callback.
    pub fn unsubscribe(&self) {
        self.gate.active.store(false, Ordering::SeqCst);

        let in_own_callback = RUNNING_GATE
            .try_with(|id| *id == self.gate.id())
            .unwrap_or(false);
        if in_own_callback {
            return;
        }

        drop(self.gate.delivering.lock().unwrap_or_else(|e| e.into_inner()));
        if let Some(task) = self
            .gate
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.gate.active.load(Ordering::SeqCst)
    }
}

/// Callback flavour of [`subscribe`].
pub fn subscribe_with<D, E>(
    store: &Store,
    group_id: &str,
    mut on_data: D,
    mut on_error: E,
) -> Unsubscribe
where
    D: FnMut(Vec<Expense>) + Send + 'static,
    E: FnMut(StoreError) + Send + 'static,
{
    let gate = Arc::new(CallbackGate {
        active: AtomicBool::new(true),
        delivering: Mutex::new(()),
        task: Mutex::new(None),
    });
    let mut subscription = subscribe(store, group_id);
    let worker_gate = Arc::clone(&gate);

    let task = tokio::spawn(async move {
        let gate = worker_gate;
        while let Some(update) = subscription.next().await {
            {
                let _delivering = gate.delivering.lock().unwrap_or_else(|e| e.into_inner());
                if !gate.active.load(Ordering::SeqCst) {
                    break;
                }
                RUNNING_GATE.sync_scope(gate.id(), || match update {
                    Ok(expenses) => on_data(expenses),
                    Err(e) => on_error(e),
                });
            }
            if !gate.active.load(Ordering::SeqCst) {
                break;
            }
        }
    });

    *gate.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    Unsubscribe { gate }
}

/// `[first of month 00:00, first of next month 00:00)` in `offset`.
pub fn calendar_month_range(
    year: i32,
    month: Month,
    offset: UtcOffset,
) -> Result<(OffsetDateTime, OffsetDateTime), StoreError> {
    let out_of_range =
        || StoreError::InvalidInput(format!("Month {} {} is out of range", month, year));
    let first = Date::from_calendar_date(year, month, 1).map_err(|_| out_of_range())?;
    let next = first_of_next_month(first).ok_or_else(out_of_range)?;

    Ok((
        PrimitiveDateTime::new(first, Time::MIDNIGHT).assume_offset(offset),
        PrimitiveDateTime::new(next, Time::MIDNIGHT).assume_offset(offset),
    ))
}

/// One-shot read of a calendar month, newest created first.
pub async fn get_expenses_for_month(
    store: &Store,
    group_id: &str,
    year: i32,
    month: Month,
    offset: UtcOffset,
) -> Result<Vec<Expense>, StoreError> {
    let (start, end) = calendar_month_range(year, month, offset)?;
    let mut expenses: Vec<Expense> = store
        .expense_documents(group_id)
        .await?
        .into_iter()
        .filter(|e| e.expense_date >= start && e.expense_date < end)
        .collect();
    sort_newest_first(&mut expenses);
    Ok(expenses)
}
