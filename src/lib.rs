//! Higher-Low Pattern Scanner
//!
//! Detects the three-point higher-low breakout setup in intraday candles,
//! simulates the resulting trade, and backtests or fine-tunes the detector
//! over historical data fetched from Polygon.io or read from CSV.

pub mod archive;
pub mod backtest;
pub mod config;
pub mod data;
pub mod grid;
pub mod market;
pub mod optimizer;
pub mod pattern;
pub mod report;
pub mod types;

pub use config::Config;
pub use pattern::{scan, scan_occurrences, Occurrence, Outcome, PatternParams, Scanner};
pub use types::*;
