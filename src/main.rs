//! Higher-low pattern scanner - main entry point
//!
//! This binary provides four subcommands:
//! - scan: Annotate one session (or a CSV file) with pattern marks and trades
//! - backtest: Summarise patterns over a date range
//! - optimize: Compare parameter sets over the same data
//! - download: Fetch historical bars from Polygon.io

use anyhow::Result;
use clap::{Parser, Subcommand};
use higher_low::data::Timespan;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "higher-low")]
#[command(about = "Higher-low breakout pattern scanner with backtesting and fine-tuning", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "configs/higher_low.json")]
    config: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a single session for patterns
    Scan {
        /// Read candles from a CSV file instead of fetching
        #[arg(long)]
        csv: Option<String>,

        /// Ticker to fetch. E.g., "AAPL"
        #[arg(short, long)]
        symbol: Option<String>,

        /// Session date (YYYY-MM-DD). Defaults to today during market hours,
        /// otherwise the last trading day
        #[arg(short, long)]
        date: Option<String>,

        /// Bar resolution to fetch
        #[arg(short, long, value_enum, default_value = "minute")]
        timespan: Timespan,

        /// Print the marks and occurrences as JSON
        #[arg(long)]
        json: bool,
    },

    /// Backtest the configured parameters over a date range (minute bars)
    Backtest {
        /// Ticker to fetch
        #[arg(short, long)]
        symbol: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Read candles from a CSV file instead of fetching
        #[arg(long)]
        csv: Option<String>,

        /// Store fetched candles in the configured archive database
        #[arg(long)]
        archive: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fine-tune parameter sets over a date range (second bars)
    Optimize {
        /// Ticker to fetch
        #[arg(short, long)]
        symbol: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Read candles from a CSV file instead of fetching
        #[arg(long)]
        csv: Option<String>,

        /// Sort results by metric (win_rate, avg_profit, patterns)
        #[arg(long, default_value = "win_rate")]
        sort_by: String,

        /// Number of top results to show (default: all)
        #[arg(short, long)]
        top: Option<usize>,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Download historical bars from Polygon.io
    Download {
        /// Ticker to fetch
        #[arg(short, long)]
        symbol: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD, default: start)
        #[arg(long)]
        end: Option<String>,

        /// Bar resolution
        #[arg(short, long, value_enum, default_value = "minute")]
        timespan: Timespan,

        /// Output directory (default: data_dir from config)
        #[arg(short, long)]
        output: Option<String>,

        /// Also store the bars in the configured archive database
        #[arg(long)]
        archive: bool,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);
        // Optimizer keeps the console for the progress bar
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Scan { .. } => ("scan", false),
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
        Commands::Download { .. } => ("download", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Scan {
            csv,
            symbol,
            date,
            timespan,
            json,
        } => commands::scan::run(cli.config, csv, symbol, date, timespan, json),

        Commands::Backtest {
            symbol,
            start,
            end,
            csv,
            archive,
            json,
        } => commands::backtest::run(cli.config, symbol, start, end, csv, archive, json),

        Commands::Optimize {
            symbol,
            start,
            end,
            csv,
            sort_by,
            top,
            sequential,
        } => commands::optimize::run(cli.config, symbol, start, end, csv, sort_by, top, sequential),

        Commands::Download {
            symbol,
            start,
            end,
            timespan,
            output,
            archive,
        } => commands::download::run(cli.config, symbol, start, end, timespan, output, archive),
    }
}
