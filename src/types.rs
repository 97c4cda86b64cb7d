//! Core data types used across the scanner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: Money, low: Money },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: Money, low: Money, high: Money },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: Money, low: Money, high: Money },
}

/// OHLC bar with the optional aggregate fields market-data providers report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub close: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vwap: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_count: Option<u64>,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Money,
        high: Money,
        low: Money,
        close: Money,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(timestamp, open, high, low, close);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: Money,
        high: Money,
        low: Money,
        close: Money,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
            vwap: None,
            trade_count: None,
        }
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if let Some(volume) = self.volume {
            if volume < 0.0 {
                return Err(CandleValidationError::NegativeVolume(volume));
            }
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }
}

/// Ticker symbol, normalized to upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(s.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Prices
// ============================================================================

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Neg, Sub};
use std::str::FromStr;

/// Money type for exact decimal arithmetic on prices and price offsets.
///
/// Wraps `rust_decimal::Decimal`. Every confirmation, disruption and exit test in
/// the scanner is a threshold comparison such as `close >= low + offset`; in f64
/// `8.0 + 0.05` is not `8.05`, which is enough to flip a boundary bar.
///
/// Serializes as a string, deserializes from either a JSON number or a string.
///
/// # Example
/// ```
/// use higher_low::Money;
/// let low: Money = "8.00".parse().unwrap();
/// let offset = Money::from_f64(0.05);
/// assert_eq!(low + offset, "8.05".parse().unwrap());
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero value
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wrap an existing decimal
    pub const fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Create from f64
    /// Note: This conversion may lose precision for values with many decimal places
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or_else(|_| {
            // Fallback for extreme values (NaN, Infinity)
            if value.is_nan() || value.is_infinite() {
                Decimal::ZERO
            } else {
                Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
            }
        }))
    }

    /// Convert to f64 (for statistics and display)
    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Create from i64 (for whole number values)
    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    /// Round to specified decimal places
    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .map(Money)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl Div for Money {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.0.is_zero() {
            Money::ZERO
        } else {
            Money(self.0 / rhs.0)
        }
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod money_tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_precision() {
        let a = Money::from_f64(0.1);
        let b = Money::from_f64(0.2);
        let c = Money::from_f64(0.3);
        assert_eq!(a + b, c, "Money should handle 0.1 + 0.2 = 0.3 correctly");
    }

    #[test]
    fn test_threshold_is_exact() {
        let low: Money = "8".parse().unwrap();
        let close: Money = "8.05".parse().unwrap();
        assert!(close >= low + Money::from_f64(0.05));
    }

    #[test]
    fn test_money_parse() {
        assert_eq!("100.50".parse::<Money>().unwrap(), Money::new(dec!(100.50)));
        assert_eq!(" 7 ".parse::<Money>().unwrap(), Money::from_i64(7));
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn test_money_neg() {
        assert_eq!(-Money::new(dec!(0.05)), Money::new(dec!(-0.05)));
    }

    #[test]
    fn test_money_div_by_zero() {
        assert_eq!(Money::from_i64(100) / Money::ZERO, Money::ZERO);
    }

    #[test]
    fn test_money_sum() {
        let values = vec![
            Money::new(dec!(0.50)),
            Money::new(dec!(-0.05)),
            Money::new(dec!(0.25)),
        ];
        let total: Money = values.iter().sum();
        assert_eq!(total, Money::new(dec!(0.70)));
    }

    #[test]
    fn test_money_serde_accepts_number_and_string() {
        let from_num: Money = serde_json::from_str("0.05").unwrap();
        let from_str: Money = serde_json::from_str("\"0.05\"").unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(serde_json::to_string(&from_num).unwrap(), "\"0.05\"");
    }

    #[test]
    fn test_candle_validation() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let m = |v: Decimal| Money::new(v);

        assert!(Candle::new(ts, m(dec!(10)), m(dec!(11)), m(dec!(9)), m(dec!(10.5))).is_ok());
        assert!(matches!(
            Candle::new(ts, m(dec!(10)), m(dec!(9)), m(dec!(11)), m(dec!(10))),
            Err(CandleValidationError::HighLessThanLow { .. })
        ));
        assert!(matches!(
            Candle::new(ts, m(dec!(10)), m(dec!(11)), m(dec!(9)), m(dec!(12))),
            Err(CandleValidationError::CloseOutOfRange { .. })
        ));

        let mut negative = Candle::new_unchecked(ts, m(dec!(10)), m(dec!(11)), m(dec!(9)), m(dec!(10)));
        negative.volume = Some(-1.0);
        assert!(matches!(
            negative.validate(),
            Err(CandleValidationError::NegativeVolume(_))
        ));
    }

    #[test]
    fn test_symbol_normalized() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
    }
}
