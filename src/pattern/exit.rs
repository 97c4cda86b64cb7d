//! Exit rules for the simulated position
//!
//! Checked in fixed priority order on every candle while a trade is open:
//! take-profit, stop-loss, timeout. The first rule that matches closes the trade.

use serde::{Deserialize, Serialize};

use super::config::PatternParams;
use super::state::TradeState;
use crate::{Candle, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    TakeProfit,
    StopLoss,
    Timeout,
}

impl Outcome {
    pub fn is_win(self) -> bool {
        self == Outcome::TakeProfit
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::TakeProfit => "take_profit",
            Outcome::StopLoss => "stop_loss",
            Outcome::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub outcome: Outcome,
    pub price: Money,
    pub profit: Money,
}

/// Evaluate the exit rules for one candle
///
/// Take-profit and stop-loss fill at the offset price, not at the candle's
/// extreme. A timeout fills at the close.
pub fn evaluate(trade: &TradeState, candle: &Candle, params: &PatternParams) -> Option<Exit> {
    let target = trade.entry_price + params.take_profit_offset;
    if candle.high >= target {
        return Some(Exit {
            outcome: Outcome::TakeProfit,
            price: target,
            profit: params.take_profit_offset,
        });
    }

    let stop = trade.entry_price - params.stop_loss_offset;
    if candle.low <= stop {
        return Some(Exit {
            outcome: Outcome::StopLoss,
            price: stop,
            profit: -params.stop_loss_offset,
        });
    }

    if candle.timestamp - trade.entry_time >= params.trade_timeout() {
        return Some(Exit {
            outcome: Outcome::Timeout,
            price: candle.close,
            profit: candle.close - trade.entry_price,
        });
    }

    None
}
