//! Attempt state for the higher-low scanner
//!
//! Each `Phase` variant carries exactly the anchors that exist at that point of
//! the pattern, so e.g. a phase holding A1 without A0 cannot be constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Candle, Money};

/// Lowest qualifying low observed for one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub timestamp: DateTime<Utc>,
    pub low: Money,
}

impl Anchor {
    pub fn at(candle: &Candle) -> Self {
        Self {
            timestamp: candle.timestamp,
            low: candle.low,
        }
    }
}

/// The three confirmed anchors of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Legs {
    pub a0: Anchor,
    pub a1: Anchor,
    pub a2: Anchor,
}

/// Open simulated position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeState {
    pub entry_price: Money,
    pub entry_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SeekingA0 {
        a0: Option<Anchor>,
    },
    /// A0 confirmed; only a lower A0 is tracked until the wait window ends
    WaitingA0 {
        a0: Anchor,
        confirmed_at: DateTime<Utc>,
    },
    SeekingA1 {
        a0: Anchor,
        a1: Option<Anchor>,
    },
    /// A1 confirmed; only a lower A1 is tracked until the wait window ends
    WaitingA1 {
        a0: Anchor,
        a1: Anchor,
        confirmed_at: DateTime<Utc>,
    },
    SeekingA2 {
        a0: Anchor,
        a1: Anchor,
        a2: Option<Anchor>,
    },
    AwaitingEntry {
        legs: Legs,
    },
    InTrade {
        legs: Legs,
        trade: TradeState,
    },
}

impl Phase {
    pub const START: Phase = Phase::SeekingA0 { a0: None };

    /// Phase number 1..=5 (wait windows belong to the phase they precede)
    pub fn number(&self) -> u8 {
        match self {
            Phase::SeekingA0 { .. } => 1,
            Phase::WaitingA0 { .. } | Phase::SeekingA1 { .. } => 2,
            Phase::WaitingA1 { .. } | Phase::SeekingA2 { .. } => 3,
            Phase::AwaitingEntry { .. } => 4,
            Phase::InTrade { .. } => 5,
        }
    }

    pub fn a0(&self) -> Option<Anchor> {
        match *self {
            Phase::SeekingA0 { a0 } => a0,
            Phase::WaitingA0 { a0, .. }
            | Phase::SeekingA1 { a0, .. }
            | Phase::WaitingA1 { a0, .. }
            | Phase::SeekingA2 { a0, .. } => Some(a0),
            Phase::AwaitingEntry { legs } | Phase::InTrade { legs, .. } => Some(legs.a0),
        }
    }

    pub fn is_in_trade(&self) -> bool {
        matches!(self, Phase::InTrade { .. })
    }
}

/// State carried from one candle to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    pub phase: Phase,
    /// Start of the current time budget; seeded by the first candle
    pub attempt_start: Option<DateTime<Utc>>,
}

impl AttemptState {
    pub fn new() -> Self {
        Self {
            phase: Phase::START,
            attempt_start: None,
        }
    }

    /// Abandon or complete the attempt and start a fresh budget at `at`
    pub fn restart(at: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::START,
            attempt_start: Some(at),
        }
    }

    /// Move to `phase`, restarting the time budget at `at`
    pub fn enter(phase: Phase, at: DateTime<Utc>) -> Self {
        Self {
            phase,
            attempt_start: Some(at),
        }
    }

    /// Keep the time budget, replace the phase
    pub fn with_phase(self, phase: Phase) -> Self {
        Self { phase, ..self }
    }
}

impl Default for AttemptState {
    fn default() -> Self {
        Self::new()
    }
}
