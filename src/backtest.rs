//! Backtesting engine
//!
//! Replays a candle history through the scanner and summarises the simulated
//! trades, overall and per calendar period.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::market::market_date;
use crate::pattern::{scan_occurrences, Occurrence, PatternParams, ScanError};
use crate::report::{group_by_period, Grouping, PeriodRow, Summary};
use crate::Candle;

/// Backtest result
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub summary: Summary,
    pub grouping: Grouping,
    pub periods: Vec<PeriodRow>,
    pub occurrences: Vec<Occurrence>,
}

/// Run a backtest over the candles whose New York date lies within `[start, end]`
pub fn run(
    candles: &[Candle],
    params: &PatternParams,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BacktestResult, ScanError> {
    let in_range: Vec<Candle> = candles
        .iter()
        .filter(|c| {
            let day = market_date(c.timestamp);
            day >= start && day <= end
        })
        .cloned()
        .collect();

    if in_range.len() < candles.len() {
        debug!(
            "Dropped {} candles outside {} to {}",
            candles.len() - in_range.len(),
            start,
            end
        );
    }

    let occurrences = scan_occurrences(&in_range, params)?;
    let grouping = Grouping::for_span(start, end);
    let summary = Summary::from_occurrences(&occurrences);
    let periods = group_by_period(&occurrences, grouping);

    info!(
        "Backtest {} to {}: {} candles, {} patterns, win rate {:.1}%",
        start,
        end,
        in_range.len(),
        summary.patterns,
        summary.win_rate_pct
    );

    Ok(BacktestResult {
        summary,
        grouping,
        periods,
        occurrences,
    })
}

/// Date range covered by a candle series, in New York dates
pub fn date_span(candles: &[Candle]) -> Option<(NaiveDate, NaiveDate)> {
    let first = candles.iter().map(|c| c.timestamp).min()?;
    let last = candles.iter().map(|c| c.timestamp).max()?;
    Some((market_date(first), market_date(last)))
}
