//! Backtest command implementation

use anyhow::{Context, Result};
use higher_low::data::Timespan;
use higher_low::report::render_periods;
use higher_low::{backtest, Config};
use tracing::info;

use super::{print_banner, Source};

pub fn run(
    config_path: String,
    symbol: Option<String>,
    start: Option<String>,
    end: Option<String>,
    csv: Option<String>,
    archive: bool,
    json: bool,
) -> Result<()> {
    info!("Starting backtest");

    let config = Config::load_or_default(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let source = Source::from_args(csv, symbol, start, end, Timespan::Minute, archive)?;
    let candles = source.load(&config)?;

    let (start, end) = match source.range() {
        Some(range) => range,
        None => backtest::date_span(&candles).context("No candles to backtest")?,
    };

    info!("Running backtest...");
    let result = backtest::run(&candles, &config.params, start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_banner("BACKTEST RESULTS");
    println!("Period:       {} to {}", start, end);
    print!("{}", result.summary.render());
    println!("{}", "=".repeat(60));
    println!();
    print!("{}", render_periods(&result.periods, result.grouping));

    info!("Backtest completed successfully");

    Ok(())
}
