//! Daily and monthly aggregates over an expense snapshot.
//!
//! Buckets are computed in the offset of the reference date. The daily bucket
//! is `[start of day, start of next day)`. The monthly bucket is
//! `[first of month 00:00, last of month 00:00]` with an inclusive upper
//! bound, so anything later on the last day falls outside it.

use serde::ser::{Serialize, SerializeMap, Serializer};
use time::util::days_in_year_month;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time};

use crate::models::Expense;

/// Category totals in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTotals {
    entries: Vec<(String, f64)>,
}

impl CategoryTotals {
    pub fn add(&mut self, key: &str, amount: f64) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, total)) => *total += amount,
            None => self.entries.push((key.to_string(), amount)),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, total)| *total)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Serialised as a JSON object whose key order is the insertion order.
impl Serialize for CategoryTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, total) in &self.entries {
            map.serialize_entry(key, total)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub daily_total: f64,
    /// Keyed by `"{segregation} - {category}"`, or the category alone.
    pub daily_summary: CategoryTotals,
    pub monthly_total: f64,
    /// Keyed by category only.
    pub monthly_summary: CategoryTotals,
}

impl Aggregates {
    pub fn monthly_chart_series(&self) -> Vec<ChartPoint> {
        self.monthly_summary
            .iter()
            .map(|(name, value)| ChartPoint {
                name: name.to_string(),
                value,
            })
            .collect()
    }
}

fn at_midnight(date: Date, reference: OffsetDateTime) -> OffsetDateTime {
    PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(reference.offset())
}

/// Half-open `[start, end)` bounds of the reference day. The end is `None`
/// when the next day is past the last representable date.
pub fn day_bounds(reference: OffsetDateTime) -> (OffsetDateTime, Option<OffsetDateTime>) {
    let date = reference.date();
    (
        at_midnight(date, reference),
        date.next_day().map(|next| at_midnight(next, reference)),
    )
}

pub fn first_of_month(date: Date) -> Date {
    date - Duration::days(i64::from(date.day()) - 1)
}

pub fn last_of_month(date: Date) -> Date {
    let last = days_in_year_month(date.year(), date.month());
    date + Duration::days(i64::from(last - date.day()))
}

/// `None` for the last representable month.
pub fn first_of_next_month(date: Date) -> Option<Date> {
    last_of_month(date).next_day()
}

/// Inclusive `[first 00:00, last 00:00]` bounds of the reference month.
pub fn month_bounds(reference: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let date = reference.date();
    (
        at_midnight(first_of_month(date), reference),
        at_midnight(last_of_month(date), reference),
    )
}

pub fn daily_key(expense: &Expense) -> String {
    match &expense.segregation {
        Some(segregation) => format!("{} - {}", segregation, expense.category),
        None => expense.category.clone(),
    }
}

/// Full recompute over `expenses` for `reference`.
pub fn aggregate(expenses: &[Expense], reference: OffsetDateTime) -> Aggregates {
    let (day_start, day_end) = day_bounds(reference);
    let (month_start, month_end) = month_bounds(reference);
    let mut out = Aggregates::default();

    for expense in expenses {
        let when = expense.expense_date;
        if when >= day_start && day_end.is_none_or(|end| when < end) {
            out.daily_total += expense.amount;
            out.daily_summary.add(&daily_key(expense), expense.amount);
        }
        if when >= month_start && when <= month_end {
            out.monthly_total += expense.amount;
            out.monthly_summary.add(&expense.category, expense.amount);
        }
    }

    out
}

pub fn daily_total(expenses: &[Expense], reference: OffsetDateTime) -> f64 {
    aggregate(expenses, reference).daily_total
}

pub fn monthly_total(expenses: &[Expense], reference: OffsetDateTime) -> f64 {
    aggregate(expenses, reference).monthly_total
}
