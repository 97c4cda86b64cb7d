// Candle Archive
// SQLite store for fetched bars, one table per resolution
//
// Prices are kept as decimal text so archived candles reload exactly.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use crate::data::Timespan;
use crate::{Candle, Money, Symbol};

const TIMESPANS: [Timespan; 4] = [
    Timespan::Second,
    Timespan::Minute,
    Timespan::Hour,
    Timespan::Day,
];

fn table(timespan: Timespan) -> &'static str {
    match timespan {
        Timespan::Second => "candles_second",
        Timespan::Minute => "candles_minute",
        Timespan::Hour => "candles_hour",
        Timespan::Day => "candles_day",
    }
}

type RawRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<f64>,
    Option<String>,
    Option<i64>,
);

pub struct CandleArchive {
    conn: Connection,
}

impl CandleArchive {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let archive = Self { conn };
        archive.create_tables()?;
        info!("Candle archive opened at {}", db_path.display());

        Ok(archive)
    }

    pub fn open_in_memory() -> Result<Self> {
        let archive = Self {
            conn: Connection::open_in_memory()?,
        };
        archive.create_tables()?;
        Ok(archive)
    }

    fn create_tables(&self) -> Result<()> {
        for timespan in TIMESPANS {
            self.conn
                .execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        symbol TEXT NOT NULL,
                        ts INTEGER NOT NULL,
                        open TEXT NOT NULL,
                        high TEXT NOT NULL,
                        low TEXT NOT NULL,
                        close TEXT NOT NULL,
                        volume REAL,
                        vwap TEXT,
                        trade_count INTEGER,
                        PRIMARY KEY (symbol, ts)
                    );",
                    table = table(timespan)
                ))
                .with_context(|| format!("Failed to create table {}", table(timespan)))?;
        }
        Ok(())
    }

    /// Insert candles, skipping any (symbol, timestamp) already stored
    ///
    /// Returns the number of new rows.
    pub fn append(&mut self, symbol: &Symbol, timespan: Timespan, candles: &[Candle]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} (symbol, ts, open, high, low, close, volume, vwap, trade_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                table(timespan)
            ))?;

            for candle in candles {
                let trade_count = candle
                    .trade_count
                    .map(i64::try_from)
                    .transpose()
                    .context("trade_count out of range")?;
                inserted += stmt.execute(params![
                    symbol.as_str(),
                    candle.timestamp.timestamp_millis(),
                    candle.open.to_string(),
                    candle.high.to_string(),
                    candle.low.to_string(),
                    candle.close.to_string(),
                    candle.volume,
                    candle.vwap.map(|v| v.to_string()),
                    trade_count,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            "Archived {} of {} {} candles for {}",
            inserted,
            candles.len(),
            timespan,
            symbol
        );
        Ok(inserted)
    }

    /// Candles dated within `[start, end]` (UTC), oldest first
    pub fn load(
        &self,
        symbol: &Symbol,
        timespan: Timespan,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>> {
        let from = start.and_time(chrono::NaiveTime::MIN).and_utc();
        let until = (end + Duration::days(1)).and_time(chrono::NaiveTime::MIN).and_utc();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT ts, open, high, low, close, volume, vwap, trade_count FROM {}
             WHERE symbol = ?1 AND ts >= ?2 AND ts < ?3 ORDER BY ts",
            table(timespan)
        ))?;

        let rows = stmt.query_map(
            params![symbol.as_str(), from.timestamp_millis(), until.timestamp_millis()],
            |row| -> rusqlite::Result<RawRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )?;

        let mut candles = Vec::new();
        for row in rows {
            candles.push(to_candle(row?)?);
        }
        Ok(candles)
    }

    pub fn count(&self, symbol: &Symbol, timespan: Timespan) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE symbol = ?1", table(timespan)),
            params![symbol.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n)?)
    }
}

fn to_candle(row: RawRow) -> Result<Candle> {
    let (ts, open, high, low, close, volume, vwap, trade_count) = row;
    let price = |s: &str| -> Result<Money> {
        s.parse::<Money>()
            .with_context(|| format!("Corrupt archived price: {}", s))
    };

    Ok(Candle {
        timestamp: DateTime::from_timestamp_millis(ts)
            .with_context(|| format!("Corrupt archived timestamp: {}", ts))?,
        open: price(&open)?,
        high: price(&high)?,
        low: price(&low)?,
        close: price(&close)?,
        volume,
        vwap: vwap.as_deref().map(price).transpose()?,
        trade_count: trade_count.map(u64::try_from).transpose()?,
    })
}
