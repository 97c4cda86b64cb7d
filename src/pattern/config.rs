//! Higher-Low Pattern Parameters
//!
//! All ten fields are required; the scanner carries no defaults of its own.
//! Price fields are offsets in the quote currency, durations are milliseconds.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::Money;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternParams {
    /// Ceiling above A0.low within which A1/A2 candidates are accepted
    #[serde(rename = "max_price_increase_above_A0")]
    pub max_price_increase_above_a0: Money,

    /// Close must reach A0.low plus this to confirm A0
    #[serde(rename = "price_increase_to_confirm_A0")]
    pub price_increase_to_confirm_a0: Money,

    /// Drop below A0.low that invalidates the attempt while seeking A1/A2/entry
    #[serde(rename = "max_decrease_below_A0")]
    pub max_decrease_below_a0: Money,

    /// Close must reach A1.low (resp. A2.low) plus this to confirm that leg
    pub price_increase_to_confirm_higher_low: Money,

    /// Budget per attempt, measured from each phase restart
    pub pattern_time_limit_ms: u64,

    /// Profit target above entry
    pub take_profit_offset: Money,

    /// Loss limit below entry
    pub stop_loss_offset: Money,

    /// Quiet period after A0/A1 confirmation before the next leg is searched
    #[serde(rename = "time_to_wait_before_confirm_Ax_ms")]
    pub time_to_wait_before_confirm_ax_ms: u64,

    /// Entry trigger band above A2.low
    #[serde(rename = "price_increase_from_A2_to_enter_trade")]
    pub price_increase_from_a2_to_enter_trade: Money,

    /// Maximum holding duration before a forced timeout exit
    pub trade_timeout_ms: u64,
}

impl PatternParams {
    pub fn pattern_time_limit(&self) -> Duration {
        millis(self.pattern_time_limit_ms)
    }

    pub fn confirm_wait(&self) -> Duration {
        millis(self.time_to_wait_before_confirm_ax_ms)
    }

    pub fn trade_timeout(&self) -> Duration {
        millis(self.trade_timeout_ms)
    }

    /// Flatten into name/value pairs, using the same names as the JSON form
    pub fn to_params(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("max_price_increase_above_A0", self.max_price_increase_above_a0.to_f64()),
            ("price_increase_to_confirm_A0", self.price_increase_to_confirm_a0.to_f64()),
            ("max_decrease_below_A0", self.max_decrease_below_a0.to_f64()),
            (
                "price_increase_to_confirm_higher_low",
                self.price_increase_to_confirm_higher_low.to_f64(),
            ),
            ("pattern_time_limit_ms", self.pattern_time_limit_ms as f64),
            ("take_profit_offset", self.take_profit_offset.to_f64()),
            ("stop_loss_offset", self.stop_loss_offset.to_f64()),
            (
                "time_to_wait_before_confirm_Ax_ms",
                self.time_to_wait_before_confirm_ax_ms as f64,
            ),
            (
                "price_increase_from_A2_to_enter_trade",
                self.price_increase_from_a2_to_enter_trade.to_f64(),
            ),
            ("trade_timeout_ms", self.trade_timeout_ms as f64),
        ]
    }
}

/// Field names accepted in JSON, in declaration order
pub const PARAM_NAMES: [&str; 10] = [
    "max_price_increase_above_A0",
    "price_increase_to_confirm_A0",
    "max_decrease_below_A0",
    "price_increase_to_confirm_higher_low",
    "pattern_time_limit_ms",
    "take_profit_offset",
    "stop_loss_offset",
    "time_to_wait_before_confirm_Ax_ms",
    "price_increase_from_A2_to_enter_trade",
    "trade_timeout_ms",
];

fn millis(ms: u64) -> Duration {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    Duration::try_milliseconds(ms).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "max_price_increase_above_A0": 0.50,
        "price_increase_to_confirm_A0": 0.05,
        "max_decrease_below_A0": 0.20,
        "price_increase_to_confirm_higher_low": 0.05,
        "pattern_time_limit_ms": 1800000,
        "take_profit_offset": 0.50,
        "stop_loss_offset": 0.05,
        "time_to_wait_before_confirm_Ax_ms": 300000,
        "price_increase_from_A2_to_enter_trade": 0.02,
        "trade_timeout_ms": 2700000
    }"#;

    #[test]
    fn test_params_from_json() {
        let params: PatternParams = serde_json::from_str(JSON).unwrap();
        assert_eq!(params.max_decrease_below_a0, "0.20".parse().unwrap());
        assert_eq!(params.pattern_time_limit(), Duration::minutes(30));
        assert_eq!(params.confirm_wait(), Duration::minutes(5));
        assert_eq!(params.trade_timeout(), Duration::minutes(45));
    }

    #[test]
    fn test_missing_field_rejected() {
        let partial = r#"{ "take_profit_offset": 0.5 }"#;
        assert!(serde_json::from_str::<PatternParams>(partial).is_err());
    }

    #[test]
    fn test_negative_duration_rejected() {
        let bad = JSON.replace("\"trade_timeout_ms\": 2700000", "\"trade_timeout_ms\": -1");
        assert!(serde_json::from_str::<PatternParams>(&bad).is_err());
    }

    #[test]
    fn test_to_params_uses_json_names() {
        let params: PatternParams = serde_json::from_str(JSON).unwrap();
        let names: Vec<&str> = params.to_params().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, PARAM_NAMES.to_vec());
    }

    #[test]
    fn test_huge_duration_saturates() {
        let bad = JSON.replace("2700000", "18446744073709551615");
        let params: PatternParams = serde_json::from_str(&bad).unwrap();
        assert!(params.trade_timeout() > Duration::days(365 * 1000));
    }
}
