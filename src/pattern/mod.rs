//! Higher-low breakout pattern detection and trade simulation

pub mod config;
pub mod exit;
pub mod scanner;
pub mod state;

pub use config::{PatternParams, PARAM_NAMES};
pub use exit::Outcome;
pub use scanner::{
    scan, scan_occurrences, step, Emitted, Mark, MarkLabel, Occurrence, ScanError, ScanOutput,
    Scanner,
};
pub use state::{Anchor, AttemptState, Legs, Phase, TradeState};
