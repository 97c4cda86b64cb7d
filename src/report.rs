//! Occurrence statistics and period breakdowns
//!
//! Summarises a list of occurrences and buckets them by the calendar period of
//! their A0 anchor, picking week, month or year buckets from the span of the run.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::market::market_date;
use crate::pattern::{Occurrence, Outcome};
use crate::Money;

const WEEKLY_MAX_DAYS: i64 = 31;
const MONTHLY_MAX_DAYS: i64 = 370;

/// Aggregate statistics over a set of occurrences
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub patterns: usize,
    /// Trades closed at take-profit
    pub wins: usize,
    pub win_rate_pct: f64,
    pub avg_profit: Money,
}

impl Summary {
    pub fn from_occurrences(occurrences: &[Occurrence]) -> Self {
        let patterns = occurrences.len();
        let wins = count_wins(occurrences.iter());
        let total: Money = occurrences.iter().map(|o| o.profit).sum();

        Self {
            patterns,
            wins,
            win_rate_pct: win_rate(wins, patterns),
            avg_profit: average(total, patterns),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Patterns:     {}\n", self.patterns));
        out.push_str(&format!("Wins (TP):    {}\n", self.wins));
        out.push_str(&format!("Win rate:     {:.1}%\n", self.win_rate_pct));
        out.push_str(&format!("Avg profit:   {}\n", self.avg_profit.round_dp(4)));
        out
    }
}

fn count_wins<'a>(occurrences: impl Iterator<Item = &'a Occurrence>) -> usize {
    occurrences
        .filter(|o| o.outcome == Outcome::TakeProfit)
        .count()
}

fn win_rate(wins: usize, patterns: usize) -> f64 {
    if patterns == 0 {
        0.0
    } else {
        wins as f64 / patterns as f64 * 100.0
    }
}

fn average(total: Money, count: usize) -> Money {
    if count == 0 {
        Money::ZERO
    } else {
        total / Money::from_i64(count as i64)
    }
}

/// Bucket size for the period table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    Week,
    Month,
    Year,
}

impl Grouping {
    /// Choose a bucket size from the number of days in `[start, end]`
    pub fn for_span(start: NaiveDate, end: NaiveDate) -> Self {
        let days = (end - start).num_days() + 1;
        if days <= WEEKLY_MAX_DAYS {
            Grouping::Week
        } else if days <= MONTHLY_MAX_DAYS {
            Grouping::Month
        } else {
            Grouping::Year
        }
    }

    /// First day of the period containing `date`
    fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Grouping::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Grouping::Month => date.with_day(1).unwrap_or(date),
            Grouping::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    fn label(self, start: NaiveDate) -> String {
        match self {
            Grouping::Week => format!("{}/{}", start, start + Duration::days(6)),
            Grouping::Month => start.format("%Y-%m").to_string(),
            Grouping::Year => start.format("%Y").to_string(),
        }
    }

    /// Period label for a timestamp's New York date, e.g. `2024-03-04/2024-03-10`,
    /// `2024-03` or `2024`
    pub fn period_of(self, timestamp: DateTime<Utc>) -> String {
        self.label(self.period_start(market_date(timestamp)))
    }
}

impl std::fmt::Display for Grouping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Grouping::Week => "week",
            Grouping::Month => "month",
            Grouping::Year => "year",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    pub period: String,
    pub patterns: usize,
    pub wins: usize,
    pub avg_profit: Money,
}

#[derive(Default)]
struct Bucket {
    patterns: usize,
    wins: usize,
    total: Money,
}

/// Bucket occurrences by the period of their A0 time (New York date), oldest period first
pub fn group_by_period(occurrences: &[Occurrence], grouping: Grouping) -> Vec<PeriodRow> {
    let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();

    for occurrence in occurrences {
        let start = grouping.period_start(market_date(occurrence.a0_time));
        let bucket = buckets.entry(start).or_default();
        bucket.patterns += 1;
        if occurrence.outcome.is_win() {
            bucket.wins += 1;
        }
        bucket.total += occurrence.profit;
    }

    buckets
        .into_iter()
        .map(|(start, bucket)| PeriodRow {
            period: grouping.label(start),
            patterns: bucket.patterns,
            wins: bucket.wins,
            avg_profit: average(bucket.total, bucket.patterns),
        })
        .collect()
}

/// Render the period table
pub fn render_periods(rows: &[PeriodRow], grouping: Grouping) -> String {
    if rows.is_empty() {
        return "No patterns to group.".to_string();
    }

    let width = rows
        .iter()
        .map(|r| r.period.len())
        .max()
        .unwrap_or(0)
        .max(grouping.to_string().len());

    let mut out = String::new();
    out.push_str(&format!(
        "{:<width$}  {:>8}  {:>6}  {:>10}\n",
        grouping.to_string().to_uppercase(),
        "PATTERNS",
        "WINS",
        "AVG PROFIT",
    ));
    out.push_str(&format!("{}\n", "-".repeat(width + 30)));
    for row in rows {
        out.push_str(&format!(
            "{:<width$}  {:>8}  {:>6}  {:>10}\n",
            row.period,
            row.patterns,
            row.wins,
            row.avg_profit.round_dp(4).to_string(),
        ));
    }
    out
}
