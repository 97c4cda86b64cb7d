//! Data loading and management
//!
//! Loads candles from CSV files and fetches aggregate bars from Polygon.io.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PolygonConfig;
use crate::{Candle, Money, Symbol};

// =============================================================================
// Constants
// =============================================================================

const PAGE_LIMIT: u32 = 50_000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bar resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Timespan {
    Second,
    Minute,
    Hour,
    Day,
}

impl Timespan {
    pub fn as_str(self) -> &'static str {
        match self {
            Timespan::Second => "second",
            Timespan::Minute => "minute",
            Timespan::Hour => "hour",
            Timespan::Day => "day",
        }
    }
}

impl std::fmt::Display for Timespan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load candles from a CSV file
///
/// Columns: `timestamp,open,high,low,close[,volume,vwap,trade_count]`.
/// Timestamps may be RFC 3339, `%Y-%m-%d %H:%M:%S` (UTC) or epoch milliseconds.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        let row = row_idx + 1;

        let dt_str = record.get(0).context("Missing timestamp column")?;
        let timestamp = parse_timestamp(dt_str)
            .with_context(|| format!("Row {}: failed to parse timestamp: {}", row, dt_str))?;

        let price = |idx: usize, name: &str| -> Result<Money> {
            let raw = record
                .get(idx)
                .with_context(|| format!("Row {}: missing {} column", row, name))?;
            raw.parse::<Money>()
                .with_context(|| format!("Row {}: failed to parse {}: {}", row, name, raw))
        };

        let mut candle = Candle::new_unchecked(
            timestamp,
            price(1, "open")?,
            price(2, "high")?,
            price(3, "low")?,
            price(4, "close")?,
        );

        if let Some(raw) = optional_field(&record, 5) {
            candle.volume = Some(
                raw.parse()
                    .with_context(|| format!("Row {}: failed to parse volume: {}", row, raw))?,
            );
        }
        if let Some(raw) = optional_field(&record, 6) {
            candle.vwap = Some(
                raw.parse()
                    .with_context(|| format!("Row {}: failed to parse vwap: {}", row, raw))?,
            );
        }
        if let Some(raw) = optional_field(&record, 7) {
            candle.trade_count = Some(
                raw.parse()
                    .with_context(|| format!("Row {}: failed to parse trade_count: {}", row, raw))?,
            );
        }

        candles.push(candle);
    }

    debug!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

fn optional_field(record: &csv::StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).filter(|s| !s.is_empty())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.and_utc());
    }
    let millis: i64 = s.parse().context("not RFC 3339, '%Y-%m-%d %H:%M:%S' or epoch ms")?;
    DateTime::from_timestamp_millis(millis).context("epoch milliseconds out of range")
}

/// Save candles to a CSV file in the layout `load_csv` reads
pub fn save_csv(path: impl AsRef<Path>, candles: &[Candle]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    writer.write_record([
        "timestamp",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "vwap",
        "trade_count",
    ])?;

    for candle in candles {
        writer.write_record([
            candle.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.map(|v| v.to_string()).unwrap_or_default(),
            candle.vwap.map(|v| v.to_string()).unwrap_or_default(),
            candle.trade_count.map(|n| n.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;

    info!("Saved {} rows to {}", candles.len(), path.display());
    Ok(())
}

/// File name used for a downloaded series
pub fn csv_filename(symbol: &Symbol, timespan: Timespan) -> String {
    format!("{}_{}.csv", symbol, timespan)
}

// =============================================================================
// Data Validation
// =============================================================================

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate candle data for consistency
///
/// Malformed bars and timestamps that go backwards are errors; repeated
/// timestamps are only warnings since the scanner accepts them in order.
pub fn validate_candles(candles: &[Candle]) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (i, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            result.errors.push(format!("Candle {}: {}", i, e));
        }
        if i > 0 {
            let previous = candles[i - 1].timestamp;
            if candle.timestamp < previous {
                result.errors.push(format!(
                    "Candle {}: timestamp {} is before {}",
                    i, candle.timestamp, previous
                ));
            } else if candle.timestamp == previous {
                result
                    .warnings
                    .push(format!("Candle {}: duplicate timestamp {}", i, candle.timestamp));
            }
        }
    }

    result
}

// =============================================================================
// Polygon.io Aggregates Fetcher
// =============================================================================

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("missing Polygon API key (set POLYGON_API_KEY)")]
    MissingApiKey,

    #[error("Polygon error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bar timestamp out of range: {0}")]
    BadTimestamp(i64),
}

#[derive(Debug, Deserialize)]
struct AggsPage {
    #[serde(default)]
    results: Vec<AggBar>,
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    t: i64,
    o: Money,
    h: Money,
    l: Money,
    c: Money,
    v: Option<f64>,
    vw: Option<Money>,
    n: Option<u64>,
}

impl AggBar {
    fn into_candle(self) -> Result<Candle, FetchError> {
        let timestamp =
            DateTime::from_timestamp_millis(self.t).ok_or(FetchError::BadTimestamp(self.t))?;
        Ok(Candle {
            timestamp,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
            vwap: self.vw,
            trade_count: self.n,
        })
    }
}

/// Blocking client for the Polygon aggregates endpoint
pub struct PolygonClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, FetchError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(FetchError::MissingApiKey)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &PolygonConfig) -> Result<Self, FetchError> {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    fn aggs_url(
        &self,
        symbol: &Symbol,
        multiplier: u32,
        timespan: Timespan,
        start: NaiveDate,
        end: NaiveDate,
    ) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url, symbol, multiplier, timespan, start, end
        )
    }

    /// Fetch all bars in `[start, end]`, following `next_url` pagination
    pub fn fetch_aggs_range(
        &self,
        symbol: &Symbol,
        multiplier: u32,
        timespan: Timespan,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, FetchError> {
        let first_url = self.aggs_url(symbol, multiplier, timespan, start, end);
        let limit = PAGE_LIMIT.to_string();

        let mut candles = Vec::new();
        let mut next_url: Option<String> = None;

        loop {
            let request = match &next_url {
                Some(url) => self.client.get(url).query(&[("apiKey", self.api_key.as_str())]),
                None => self.client.get(&first_url).query(&[
                    ("adjusted", "true"),
                    ("sort", "asc"),
                    ("limit", limit.as_str()),
                    ("apiKey", self.api_key.as_str()),
                ]),
            };

            let response = request.send()?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: AggsPage = response.json()?;
            debug!("{} {}: page of {} bars", symbol, timespan, page.results.len());

            for bar in page.results {
                candles.push(bar.into_candle()?);
            }

            match page.next_url {
                Some(url) if next_url.as_deref() != Some(url.as_str()) => next_url = Some(url),
                _ => break,
            }
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    /// Fetch one day at a time and concatenate; days without bars are skipped
    pub fn fetch_days(
        &self,
        symbol: &Symbol,
        timespan: Timespan,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, FetchError> {
        let mut all = Vec::new();

        for day in start.iter_days().take_while(|d| *d <= end) {
            let candles = self.fetch_aggs_range(symbol, 1, timespan, day, day)?;
            if candles.is_empty() {
                debug!("No {} bars for {} on {}", timespan, symbol, day);
                continue;
            }
            info!("Fetched {} {} bars for {} on {}", candles.len(), timespan, symbol, day);
            all.extend(candles);
        }

        if all.is_empty() {
            warn!("No {} data for {} between {} and {}", timespan, symbol, start, end);
        }
        Ok(all)
    }
}
