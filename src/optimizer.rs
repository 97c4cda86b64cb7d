//! Parameter fine-tuning
//!
//! Runs the scanner once per parameter set over the same candles and compares
//! the outcomes. Sets are independent, so they are evaluated in parallel.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;

use crate::pattern::{scan_occurrences, PatternParams, ScanError};
use crate::report::Summary;
use crate::{Candle, Money};

/// Fine-tuning result for a single parameter set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FineTuneResult {
    /// 1-based position of the set in the input
    pub set_id: usize,
    pub params: PatternParams,
    pub patterns: usize,
    /// Rounded to one decimal place
    pub win_rate_pct: f64,
    /// Rounded to four decimal places
    pub avg_profit: Money,
}

impl FineTuneResult {
    fn new(set_id: usize, params: PatternParams, summary: Summary) -> Self {
        FineTuneResult {
            set_id,
            params,
            patterns: summary.patterns,
            win_rate_pct: (summary.win_rate_pct * 10.0).round() / 10.0,
            avg_profit: summary.avg_profit.round_dp(4),
        }
    }
}

fn evaluate(
    candles: &[Candle],
    set_id: usize,
    params: &PatternParams,
) -> Result<FineTuneResult, ScanError> {
    let occurrences = scan_occurrences(candles, params)?;
    Ok(FineTuneResult::new(
        set_id,
        *params,
        Summary::from_occurrences(&occurrences),
    ))
}

/// Evaluate every parameter set against `candles`
///
/// Results come back in input order regardless of scheduling. `progress`, when
/// given, is ticked once per finished set.
pub fn fine_tune(
    candles: &[Candle],
    sets: &[PatternParams],
    progress: Option<&ProgressBar>,
    sequential: bool,
) -> Result<Vec<FineTuneResult>, ScanError> {
    let tick = || {
        if let Some(pb) = progress {
            pb.inc(1);
        }
    };

    if sequential {
        tracing::info!("Testing {} parameter sets sequentially", sets.len());
        sets.iter()
            .enumerate()
            .map(|(i, params)| {
                let result = evaluate(candles, i + 1, params);
                tick();
                result
            })
            .collect()
    } else {
        tracing::info!("Testing {} parameter sets in parallel", sets.len());
        sets.par_iter()
            .enumerate()
            .map(|(i, params)| {
                let result = evaluate(candles, i + 1, params);
                tick();
                result
            })
            .collect()
    }
}

/// Sort fine-tuning results by the specified metric, best first
///
/// Accepts `win_rate` (default), `avg_profit` or `patterns`. Ties keep set order.
pub fn sort_results(results: &mut [FineTuneResult], sort_by: &str) {
    results.sort_by(|a, b| {
        let ordering = match sort_by {
            "avg_profit" => b.avg_profit.cmp(&a.avg_profit),
            "patterns" => b.patterns.cmp(&a.patterns),
            _ => b
                .win_rate_pct
                .partial_cmp(&a.win_rate_pct)
                .unwrap_or(std::cmp::Ordering::Equal),
        };
        ordering.then(a.set_id.cmp(&b.set_id))
    });
}

/// Render results as a table
pub fn render_results(results: &[FineTuneResult]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>6}  {:>8}  {:>9}  {:>10}\n",
        "SET", "PATTERNS", "WIN RATE", "AVG PROFIT"
    ));
    out.push_str(&format!("{}\n", "-".repeat(39)));
    for r in results {
        out.push_str(&format!(
            "{:>6}  {:>8}  {:>8.1}%  {:>10}\n",
            r.set_id,
            r.patterns,
            r.win_rate_pct,
            r.avg_profit.to_string()
        ));
    }
    out
}
