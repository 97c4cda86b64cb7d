//! Optimize command implementation with progress tracking

use anyhow::Result;
use higher_low::data::Timespan;
use higher_low::optimizer::{fine_tune, render_results, sort_results};
use higher_low::Config;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::{print_banner, Source};

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: String,
    symbol: Option<String>,
    start: Option<String>,
    end: Option<String>,
    csv: Option<String>,
    sort_by: String,
    top: Option<usize>,
    sequential: bool,
) -> Result<()> {
    info!("Starting optimization");

    let config = Config::load_or_default(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let sets = config.fine_tune_sets()?;
    info!("Parameter sets: {}", sets.len());

    let source = Source::from_args(csv, symbol, start, end, Timespan::Second, false)?;
    let candles = source.load(&config)?;

    print_banner("OPTIMIZATION SUMMARY");
    println!("  Candles:       {}", candles.len());
    println!("  Parameters:    {} sets", sets.len());
    println!("  Mode:          {}", if sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(60));

    let pb = ProgressBar::new(sets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")?
            .progress_chars("█░ "),
    );

    let mut results = fine_tune(&candles, &sets, Some(&pb), sequential)?;
    pb.finish();
    println!();

    sort_results(&mut results, &sort_by);
    info!("Total results: {}, sorted by: {}", results.len(), sort_by);

    let shown = top.unwrap_or(results.len()).min(results.len());
    print_banner(&format!("TOP {} PARAMETER SETS (by {})", shown, sort_by));
    print!("{}", render_results(&results[..shown]));

    if let Some(best) = results.first() {
        println!("\nBest set #{}:", best.set_id);
        for (name, value) in best.params.to_params() {
            println!("  {:<40} {}", name, value);
        }
    }

    info!("Optimization completed");

    Ok(())
}
