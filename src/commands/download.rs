//! Download command - fetch historical bars from Polygon.io into CSV

use anyhow::Result;
use higher_low::data::{self, PolygonClient, Timespan};
use higher_low::{Config, Symbol};
use std::path::PathBuf;
use tracing::info;

use super::{archive_candles, parse_date, print_banner};

pub fn run(
    config_path: String,
    symbol: String,
    start: String,
    end: Option<String>,
    timespan: Timespan,
    output: Option<String>,
    archive: bool,
) -> Result<()> {
    let config = Config::load_or_default(&config_path)?;

    let symbol = Symbol::new(symbol);
    let start = parse_date(&start)?;
    let end = match end {
        Some(e) => parse_date(&e)?,
        None => start,
    };
    if end < start {
        anyhow::bail!("End date {} is before start date {}", end, start);
    }
    let output = output.unwrap_or_else(|| config.data.data_dir.clone());

    print_banner("DOWNLOADING HISTORICAL DATA FROM POLYGON");
    println!("  Symbol:     {}", symbol);
    println!("  Timespan:   {}", timespan);
    println!("  Range:      {} to {}", start, end);
    println!("  Output:     {}", output);
    println!("{}\n", "=".repeat(60));

    let client = PolygonClient::from_config(&config.polygon)?;
    let candles = client.fetch_days(&symbol, timespan, start, end)?;

    let path = PathBuf::from(&output).join(data::csv_filename(&symbol, timespan));
    data::save_csv(&path, &candles)?;
    println!("✓ {} candles -> {}", candles.len(), path.display());

    if archive {
        archive_candles(&config, &symbol, timespan, &candles)?;
    }

    info!("Download completed");
    Ok(())
}
