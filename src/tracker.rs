//! Per-user session state: the group list, the selected group and date, the
//! live expense snapshot of that group and the aggregates derived from it.
//!
//! A `Tracker` is created with [`Tracker::start`] and torn down with
//! [`Tracker::shutdown`]; dropping it closes the feed as well. Switching
//! groups closes the old feed before the new one opens, and updates are
//! checked against the selected group before they are applied.

use serde::Serialize;
use time::{Month, OffsetDateTime, UtcOffset};

use crate::aggregator::{Aggregates, ChartPoint, aggregate};
use crate::constants::{ERR_FEED_UNAVAILABLE, RECENT_TRANSACTIONS_PREVIEW};
use crate::feed::{Subscription, get_expenses_for_month, subscribe};
use crate::groups::list_groups;
use crate::models::{Expense, GroupMeta};
use crate::preferences::Preferences;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A fresh snapshot was applied and the aggregates recomputed.
    Updated,
    /// Something the user should be told about.
    Notice(String),
}

/// Ticket for a one-shot month read; only the latest one is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthRequest {
    pub token: u64,
    pub group_id: String,
    pub year: i32,
    pub month: Month,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub group: Option<GroupMeta>,
    #[serde(with = "time::serde::rfc3339")]
    pub selected_date: OffsetDateTime,
    pub expenses: Vec<Expense>,
    #[serde(flatten)]
    pub aggregates: Aggregates,
    pub monthly_chart_series: Vec<ChartPoint>,
}

pub struct Tracker {
    store: Store,
    preferences: Preferences,
    user_id: String,
    groups: Vec<GroupMeta>,
    selected: Option<GroupMeta>,
    selected_date: OffsetDateTime,
    feed: Option<Subscription>,
    expenses: Vec<Expense>,
    aggregates: Aggregates,
    month_token: u64,
}

impl Tracker {
    /// Loads the user's groups, restores the stored selection (or falls back
    /// to the first group) and opens its feed.
    pub async fn start(
        store: Store,
        preferences: Preferences,
        user_id: &str,
        selected_date: OffsetDateTime,
    ) -> Result<Self, StoreError> {
        let groups = list_groups(&store, user_id).await?;
        let stored = preferences.selected_group_id(user_id).await?;

        let mut tracker = Tracker {
            store,
            preferences,
            user_id: user_id.to_string(),
            groups,
            selected: None,
            selected_date,
            feed: None,
            expenses: Vec::new(),
            aggregates: Aggregates::default(),
            month_token: 0,
        };

        let initial = stored
            .filter(|id| tracker.groups.iter().any(|g| &g.id == id))
            .or_else(|| tracker.groups.first().map(|g| g.id.clone()));
        if let Some(group_id) = initial {
            tracker.select_group(&group_id).await?;
        }

        Ok(tracker)
    }

    pub fn groups(&self) -> &[GroupMeta] {
        &self.groups
    }

    pub fn selected_group(&self) -> Option<&GroupMeta> {
        self.selected.as_ref()
    }

    pub fn selected_date(&self) -> OffsetDateTime {
        self.selected_date
    }

    pub fn offset(&self) -> UtcOffset {
        self.selected_date.offset()
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    /// First few expenses, or all of them.
    pub fn recent_transactions(&self, show_all: bool) -> &[Expense] {
        if show_all {
            &self.expenses
        } else {
            &self.expenses[..self.expenses.len().min(RECENT_TRANSACTIONS_PREVIEW)]
        }
    }

    fn is_selected(&self, group_id: &str) -> bool {
        self.selected.as_ref().is_some_and(|g| g.id == group_id)
    }

    /// Switches to `group_id`. Returns `false` for a group the user is not in.
    pub async fn select_group(&mut self, group_id: &str) -> Result<bool, StoreError> {
        let Some(group) = self.groups.iter().find(|g| g.id == group_id).cloned() else {
            return Ok(false);
        };
        if self.is_selected(group_id) && self.feed.is_some() {
            self.selected = Some(group);
            return Ok(true);
        }

        if let Some(mut old) = self.feed.take() {
            old.unsubscribe();
        }
        self.expenses.clear();
        self.recompute();

        self.feed = Some(subscribe(&self.store, &group.id));
        self.selected = Some(group);
        self.preferences
            .set_selected_group_id(&self.user_id, group_id)
            .await?;

        log::debug!("user {} selected group {}", self.user_id, group_id);
        Ok(true)
    }

    /// Re-reads the group list, keeping the selection when it still exists.
    pub async fn refresh_groups(&mut self) -> Result<(), StoreError> {
        self.groups = list_groups(&self.store, &self.user_id).await?;

        let keep = self
            .selected
            .as_ref()
            .map(|g| g.id.clone())
            .filter(|id| self.groups.iter().any(|g| &g.id == id));
        match keep.or_else(|| self.groups.first().map(|g| g.id.clone())) {
            Some(group_id) => {
                self.select_group(&group_id).await?;
            }
            None => self.shutdown(),
        }
        Ok(())
    }

    pub fn set_date(&mut self, date: OffsetDateTime) {
        self.selected_date = date;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.aggregates = aggregate(&self.expenses, self.selected_date);
    }

    /// Waits for the next feed update of the selected group and applies it.
    /// Returns `None` when no feed is open.
    pub async fn next_update(&mut self) -> Option<TrackerEvent> {
        loop {
            let feed = self.feed.as_mut()?;
            let update = feed.next().await?;
            let feed_group = feed.group_id().to_string();
            if !self.is_selected(&feed_group) {
                log::debug!("dropping update for deselected group {}", feed_group);
                continue;
            }

            return Some(match update {
                Ok(expenses) => {
                    self.expenses = expenses;
                    self.recompute();
                    TrackerEvent::Updated
                }
                Err(e) => {
                    log::error!("error fetching group expenses: {}", e);
                    TrackerEvent::Notice(ERR_FEED_UNAVAILABLE.to_string())
                }
            });
        }
    }

    /// Issues a month request for the selected group and date, superseding
    /// any earlier one.
    pub fn begin_month_request(&mut self) -> Option<MonthRequest> {
        let group = self.selected.as_ref()?;
        self.month_token += 1;
        Some(MonthRequest {
            token: self.month_token,
            group_id: group.id.clone(),
            year: self.selected_date.year(),
            month: self.selected_date.month(),
        })
    }

    /// Passes the response through only if the request is still current.
    pub fn accept_month(
        &self,
        request: &MonthRequest,
        expenses: Vec<Expense>,
    ) -> Option<Vec<Expense>> {
        let current = request.token == self.month_token
            && self.is_selected(&request.group_id)
            && request.year == self.selected_date.year()
            && request.month == self.selected_date.month();
        if !current {
            log::debug!("discarding stale month response (token {})", request.token);
            return None;
        }
        Some(expenses)
    }

    /// Reads the selected month of the selected group.
    pub async fn month_expenses(&mut self) -> Result<Option<Vec<Expense>>, StoreError> {
        let Some(request) = self.begin_month_request() else {
            return Ok(None);
        };
        let expenses = get_expenses_for_month(
            &self.store,
            &request.group_id,
            request.year,
            request.month,
            self.offset(),
        )
        .await?;
        Ok(self.accept_month(&request, expenses))
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            group: self.selected.clone(),
            selected_date: self.selected_date,
            expenses: self.expenses.clone(),
            aggregates: self.aggregates.clone(),
            monthly_chart_series: self.aggregates.monthly_chart_series(),
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.unsubscribe();
        }
    }
}
