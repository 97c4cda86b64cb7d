//! Scan command implementation

use anyhow::Result;
use chrono::Utc;
use higher_low::data::Timespan;
use higher_low::pattern::{scan, ScanOutput};
use higher_low::{market, Config};
use tracing::info;

use super::{parse_date, print_banner, Source};

pub fn run(
    config_path: String,
    csv: Option<String>,
    symbol: Option<String>,
    date: Option<String>,
    timespan: Timespan,
    json: bool,
) -> Result<()> {
    let config = Config::load_or_default(&config_path)?;

    let session = match (&csv, date) {
        (Some(_), _) => None,
        (None, Some(d)) => Some(parse_date(&d)?),
        (None, None) => {
            let day = market::default_session(Utc::now());
            info!("No date given, scanning session {}", day);
            Some(day)
        }
    };
    let session = session.map(|d| d.to_string());

    let source = Source::from_args(csv, symbol, session.clone(), session, timespan, false)?;
    let candles = source.load(&config)?;

    let output = scan(&candles, &config.params)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_scan(&output);
    }

    Ok(())
}

fn print_scan(output: &ScanOutput) {
    print_banner("MARKS");
    for mark in &output.marks {
        println!(
            "{}  {:<4}  {}",
            mark.timestamp.format("%Y-%m-%d %H:%M:%S"),
            mark.label.as_str(),
            mark.price
        );
    }

    print_banner("OCCURRENCES");
    if output.occurrences.is_empty() {
        println!("No patterns found.");
        return;
    }
    for (i, o) in output.occurrences.iter().enumerate() {
        println!(
            "#{:<3} A0 {} @ {}  entry {} @ {}  exit {} @ {}  {:<11} {}",
            i + 1,
            o.a0_time.format("%H:%M:%S"),
            o.a0_low,
            o.entry_time.format("%H:%M:%S"),
            o.entry_price,
            o.exit_time.format("%H:%M:%S"),
            o.exit_price,
            o.outcome.as_str(),
            o.profit
        );
    }
    println!("{}", "=".repeat(60));
}
