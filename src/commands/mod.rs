//! Subcommand implementations and the candle-loading steps they share

pub mod backtest;
pub mod download;
pub mod optimize;
pub mod scan;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use higher_low::archive::CandleArchive;
use higher_low::data::{self, PolygonClient, Timespan};
use higher_low::{Candle, Config, Symbol};
use tracing::{info, warn};

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// Where a command's candles come from
pub(crate) enum Source {
    Csv(String),
    Polygon {
        symbol: Symbol,
        start: NaiveDate,
        end: NaiveDate,
        timespan: Timespan,
        archive: bool,
    },
}

impl Source {
    /// Resolve CLI arguments: a CSV path wins, otherwise a symbol and start date are required
    pub(crate) fn from_args(
        csv: Option<String>,
        symbol: Option<String>,
        start: Option<String>,
        end: Option<String>,
        timespan: Timespan,
        archive: bool,
    ) -> Result<Self> {
        if let Some(path) = csv {
            return Ok(Source::Csv(path));
        }

        let symbol = symbol.context("Either --csv or --symbol is required")?;
        let start = parse_date(&start.context("--start is required when fetching")?)?;
        let end = match end {
            Some(e) => parse_date(&e)?,
            None => start,
        };
        if end < start {
            anyhow::bail!("End date {} is before start date {}", end, start);
        }

        Ok(Source::Polygon {
            symbol: Symbol::new(symbol),
            start,
            end,
            timespan,
            archive,
        })
    }

    /// Load the candles, validating them before use
    pub(crate) fn load(&self, config: &Config) -> Result<Vec<Candle>> {
        let candles = match self {
            Source::Csv(path) => {
                info!("Loading candles from: {}", path);
                data::load_csv(path)?
            }
            Source::Polygon {
                symbol,
                start,
                end,
                timespan,
                archive,
            } => {
                info!("Fetching {} {} bars from {} to {}", symbol, timespan, start, end);
                let client = PolygonClient::from_config(&config.polygon)?;
                let candles = client.fetch_days(symbol, *timespan, *start, *end)?;
                if *archive {
                    archive_candles(config, symbol, *timespan, &candles)?;
                }
                candles
            }
        };

        let validation = data::validate_candles(&candles);
        for warning in &validation.warnings {
            warn!("{}", warning);
        }
        if !validation.is_ok() {
            anyhow::bail!(
                "{} invalid candles, first: {}",
                validation.errors.len(),
                validation.errors[0]
            );
        }

        info!("Loaded {} candles", candles.len());
        Ok(candles)
    }

    /// Requested date range, if the source names one
    pub(crate) fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            Source::Csv(_) => None,
            Source::Polygon { start, end, .. } => Some((*start, *end)),
        }
    }
}

pub(crate) fn archive_candles(
    config: &Config,
    symbol: &Symbol,
    timespan: Timespan,
    candles: &[Candle],
) -> Result<()> {
    let path = config
        .data
        .archive_db
        .as_deref()
        .context("--archive needs data.archive_db in the config")?;
    let mut archive = CandleArchive::open(path)?;
    let added = archive.append(symbol, timespan, candles)?;
    info!(
        "Archived {} new {} bars for {} ({} total)",
        added,
        timespan,
        symbol,
        archive.count(symbol, timespan)?
    );
    Ok(())
}

pub(crate) fn print_banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{}", title);
    println!("{}", "=".repeat(60));
}
