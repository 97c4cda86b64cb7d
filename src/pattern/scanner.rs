//! Higher-Low Pattern Scanner
//!
//! Single forward pass over a candle sequence:
//! 1. Seek A0, a local low, and confirm it once a close clears it by an offset
//! 2. After a wait window, seek a higher low A1 inside a band above A0 and confirm it
//! 3. After another wait window, seek A2 in the same band above A0 and confirm it
//! 4. Enter when a close pulls back to within an offset of A2
//! 5. Manage the trade to take-profit, stop-loss or timeout
//!
//! A low more than `max_decrease_below_A0` under A0 while seeking A1, A2 or the
//! entry abandons the attempt. Every phase change restarts the attempt time
//! budget; exceeding it abandons whatever is in progress, an open trade included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::config::PatternParams;
use super::exit::{self, Exit, Outcome};
use super::state::{Anchor, AttemptState, Legs, Phase, TradeState};
use crate::{Candle, Money};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("candle {index} at {timestamp} is earlier than the preceding candle at {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkLabel {
    #[serde(rename = "A0?")]
    A0Candidate,
    #[serde(rename = "A0✓")]
    A0Confirmed,
    #[serde(rename = "A0*")]
    A0Lowered,
    #[serde(rename = "A1?")]
    A1Candidate,
    #[serde(rename = "A1✓")]
    A1Confirmed,
    #[serde(rename = "A1*")]
    A1Lowered,
    #[serde(rename = "A2?")]
    A2Candidate,
    #[serde(rename = "A2✓")]
    A2Confirmed,
    #[serde(rename = "BUY")]
    Buy,
}

impl MarkLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkLabel::A0Candidate => "A0?",
            MarkLabel::A0Confirmed => "A0✓",
            MarkLabel::A0Lowered => "A0*",
            MarkLabel::A1Candidate => "A1?",
            MarkLabel::A1Confirmed => "A1✓",
            MarkLabel::A1Lowered => "A1*",
            MarkLabel::A2Candidate => "A2?",
            MarkLabel::A2Confirmed => "A2✓",
            MarkLabel::Buy => "BUY",
        }
    }
}

impl std::fmt::Display for MarkLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart annotation for a notable state event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    pub timestamp: DateTime<Utc>,
    pub price: Money,
    pub label: MarkLabel,
}

/// A detected pattern together with the outcome of the trade taken on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub a0_time: DateTime<Utc>,
    pub a0_low: Money,
    pub a1_time: Option<DateTime<Utc>>,
    pub a1_low: Option<Money>,
    pub a2_time: Option<DateTime<Utc>>,
    pub a2_low: Option<Money>,
    pub entry_time: DateTime<Utc>,
    pub entry_price: Money,
    pub exit_time: DateTime<Utc>,
    pub exit_price: Money,
    pub outcome: Outcome,
    pub profit: Money,
}

impl Occurrence {
    fn closed(legs: &Legs, trade: &TradeState, exit_time: DateTime<Utc>, exit: Exit) -> Self {
        Self {
            a0_time: legs.a0.timestamp,
            a0_low: legs.a0.low,
            a1_time: Some(legs.a1.timestamp),
            a1_low: Some(legs.a1.low),
            a2_time: Some(legs.a2.timestamp),
            a2_low: Some(legs.a2.low),
            entry_time: trade.entry_time,
            entry_price: trade.entry_price,
            exit_time,
            exit_price: exit.price,
            outcome: exit.outcome,
            profit: exit.profit,
        }
    }
}

/// What one candle produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emitted {
    pub marks: Vec<Mark>,
    pub occurrence: Option<Occurrence>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanOutput {
    pub occurrences: Vec<Occurrence>,
    pub marks: Vec<Mark>,
}

/// Advance the state machine by one candle
///
/// `prev_low` is the low of the candle immediately before this one in the
/// input, or `None` for the first candle. Pure: the same inputs always produce
/// the same next state and emissions.
pub fn step(
    state: AttemptState,
    candle: &Candle,
    prev_low: Option<Money>,
    params: &PatternParams,
) -> (AttemptState, Emitted) {
    transition(state, candle, prev_low, params, true)
}

fn transition(
    state: AttemptState,
    candle: &Candle,
    prev_low: Option<Money>,
    params: &PatternParams,
    record_marks: bool,
) -> (AttemptState, Emitted) {
    let ts = candle.timestamp;
    let start = state.attempt_start.unwrap_or(ts);

    let state = if ts - start > params.pattern_time_limit() {
        if state.phase.is_in_trade() {
            debug!("Attempt time limit reached with a trade open at {}, abandoning", ts);
        } else if state.phase != Phase::START {
            debug!("Attempt time limit reached in phase {} at {}", state.phase.number(), ts);
        }
        AttemptState::restart(ts)
    } else {
        AttemptState {
            attempt_start: Some(start),
            ..state
        }
    };

    let mut machine = Transition {
        candle,
        params,
        candidate: prev_low.is_some_and(|prev| candle.low < prev),
        record_marks,
        marks: Vec::new(),
    };
    let (next, occurrence) = machine.apply(state);

    (
        next,
        Emitted {
            marks: machine.marks,
            occurrence,
        },
    )
}

struct Transition<'a> {
    candle: &'a Candle,
    params: &'a PatternParams,
    /// Low strictly below the preceding candle's low
    candidate: bool,
    record_marks: bool,
    marks: Vec<Mark>,
}

impl Transition<'_> {
    fn apply(&mut self, state: AttemptState) -> (AttemptState, Option<Occurrence>) {
        match state.phase {
            Phase::SeekingA0 { a0 } => (self.seek_a0(state, a0), None),
            Phase::WaitingA0 { a0, confirmed_at } => {
                if self.in_wait_window(confirmed_at) {
                    let a0 = self.lower(a0, MarkLabel::A0Lowered);
                    (state.with_phase(Phase::WaitingA0 { a0, confirmed_at }), None)
                } else {
                    (self.seek_a1(state, a0, None), None)
                }
            }
            Phase::SeekingA1 { a0, a1 } => (self.seek_a1(state, a0, a1), None),
            Phase::WaitingA1 {
                a0,
                a1,
                confirmed_at,
            } => {
                if self.in_wait_window(confirmed_at) {
                    let a1 = self.lower(a1, MarkLabel::A1Lowered);
                    let phase = Phase::WaitingA1 {
                        a0,
                        a1,
                        confirmed_at,
                    };
                    (state.with_phase(phase), None)
                } else {
                    (self.seek_a2(state, a0, a1, None), None)
                }
            }
            Phase::SeekingA2 { a0, a1, a2 } => (self.seek_a2(state, a0, a1, a2), None),
            Phase::AwaitingEntry { legs } => (self.await_entry(state, legs), None),
            Phase::InTrade { legs, trade } => self.manage_trade(state, legs, trade),
        }
    }

    fn seek_a0(&mut self, state: AttemptState, a0: Option<Anchor>) -> AttemptState {
        let c = self.candle;
        let mut a0 = a0;

        if self.candidate && a0.map_or(true, |a| c.low < a.low) {
            a0 = Some(Anchor::at(c));
            self.mark(c.low, MarkLabel::A0Candidate);
        }

        match a0 {
            Some(a0) if c.close >= a0.low + self.params.price_increase_to_confirm_a0 => {
                debug!("A0 confirmed at {} (low {}, close {})", c.timestamp, a0.low, c.close);
                self.mark(c.close, MarkLabel::A0Confirmed);
                let phase = Phase::WaitingA0 {
                    a0,
                    confirmed_at: c.timestamp,
                };
                AttemptState::enter(phase, c.timestamp)
            }
            _ => state.with_phase(Phase::SeekingA0 { a0 }),
        }
    }

    fn seek_a1(&mut self, state: AttemptState, a0: Anchor, a1: Option<Anchor>) -> AttemptState {
        let c = self.candle;
        let a1 = self.higher_low(a0, a1, MarkLabel::A1Candidate);

        if let Some(a1) = self.confirmed(a1) {
            debug!("A1 confirmed at {} (low {}, close {})", c.timestamp, a1.low, c.close);
            self.mark(c.close, MarkLabel::A1Confirmed);
            let phase = Phase::WaitingA1 {
                a0,
                a1,
                confirmed_at: c.timestamp,
            };
            return AttemptState::enter(phase, c.timestamp);
        }

        if self.disrupted(a0) {
            return AttemptState::restart(c.timestamp);
        }

        state.with_phase(Phase::SeekingA1 { a0, a1 })
    }

    fn seek_a2(
        &mut self,
        state: AttemptState,
        a0: Anchor,
        a1: Anchor,
        a2: Option<Anchor>,
    ) -> AttemptState {
        let c = self.candle;
        let a2 = self.higher_low(a0, a2, MarkLabel::A2Candidate);

        if let Some(a2) = self.confirmed(a2) {
            debug!("A2 confirmed at {} (low {}, close {})", c.timestamp, a2.low, c.close);
            self.mark(c.close, MarkLabel::A2Confirmed);
            let legs = Legs { a0, a1, a2 };
            return AttemptState::enter(Phase::AwaitingEntry { legs }, c.timestamp);
        }

        if self.disrupted(a0) {
            return AttemptState::restart(c.timestamp);
        }

        state.with_phase(Phase::SeekingA2 { a0, a1, a2 })
    }

    fn await_entry(&mut self, state: AttemptState, legs: Legs) -> AttemptState {
        let c = self.candle;

        if c.close <= legs.a2.low + self.params.price_increase_from_a2_to_enter_trade {
            debug!("Entry at {} @ {}", c.timestamp, c.close);
            self.mark(c.close, MarkLabel::Buy);
            let trade = TradeState {
                entry_price: c.close,
                entry_time: c.timestamp,
            };
            return AttemptState::enter(Phase::InTrade { legs, trade }, c.timestamp);
        }

        if self.disrupted(legs.a0) {
            return AttemptState::restart(c.timestamp);
        }

        state
    }

    fn manage_trade(
        &mut self,
        state: AttemptState,
        legs: Legs,
        trade: TradeState,
    ) -> (AttemptState, Option<Occurrence>) {
        let c = self.candle;
        match exit::evaluate(&trade, c, self.params) {
            Some(exit) => {
                debug!(
                    "Trade closed at {}: {} @ {} (profit {})",
                    c.timestamp, exit.outcome, exit.price, exit.profit
                );
                let occurrence = Occurrence::closed(&legs, &trade, c.timestamp, exit);
                (AttemptState::restart(c.timestamp), Some(occurrence))
            }
            None => (state, None),
        }
    }

    fn in_wait_window(&self, confirmed_at: DateTime<Utc>) -> bool {
        self.candle.timestamp - confirmed_at < self.params.confirm_wait()
    }

    /// Replace `anchor` if this candle's low is strictly lower
    fn lower(&mut self, anchor: Anchor, label: MarkLabel) -> Anchor {
        if self.candle.low < anchor.low {
            self.mark(self.candle.low, label);
            Anchor::at(self.candle)
        } else {
            anchor
        }
    }

    /// Track the lowest candidate low inside `(A0.low, A0.low + max_price_increase_above_A0]`
    fn higher_low(&mut self, a0: Anchor, current: Option<Anchor>, label: MarkLabel) -> Option<Anchor> {
        let low = self.candle.low;
        let in_band = low > a0.low && low <= a0.low + self.params.max_price_increase_above_a0;

        if self.candidate && in_band && current.map_or(true, |a| low < a.low) {
            self.mark(low, label);
            Some(Anchor::at(self.candle))
        } else {
            current
        }
    }

    fn confirmed(&self, anchor: Option<Anchor>) -> Option<Anchor> {
        anchor.filter(|a| {
            self.candle.close >= a.low + self.params.price_increase_to_confirm_higher_low
        })
    }

    fn disrupted(&self, a0: Anchor) -> bool {
        let disrupted = a0.low - self.candle.low > self.params.max_decrease_below_a0;
        if disrupted {
            debug!(
                "Disruption at {}: low {} too far below A0 {}",
                self.candle.timestamp, self.candle.low, a0.low
            );
        }
        disrupted
    }

    fn mark(&mut self, price: Money, label: MarkLabel) {
        if self.record_marks {
            self.marks.push(Mark {
                timestamp: self.candle.timestamp,
                price,
                label,
            });
        }
    }
}

/// Incremental scanner for feeding candles one at a time (e.g. live annotation)
#[derive(Debug, Clone)]
pub struct Scanner {
    params: PatternParams,
    state: AttemptState,
    previous: Option<(DateTime<Utc>, Money)>,
    seen: usize,
    record_marks: bool,
}

impl Scanner {
    pub fn new(params: PatternParams) -> Self {
        Self {
            params,
            state: AttemptState::new(),
            previous: None,
            seen: 0,
            record_marks: true,
        }
    }

    /// Scanner that skips building marks
    pub fn without_marks(params: PatternParams) -> Self {
        Self {
            record_marks: false,
            ..Self::new(params)
        }
    }

    pub fn params(&self) -> &PatternParams {
        &self.params
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    /// Feed the next candle
    ///
    /// A candle earlier than its predecessor is rejected and leaves the
    /// scanner untouched. Equal timestamps are accepted in arrival order.
    pub fn push(&mut self, candle: &Candle) -> Result<Emitted, ScanError> {
        let prev_low = match self.previous {
            Some((previous, _)) if candle.timestamp < previous => {
                return Err(ScanError::OutOfOrder {
                    index: self.seen,
                    timestamp: candle.timestamp,
                    previous,
                });
            }
            Some((_, low)) => Some(low),
            None => None,
        };

        let (next, emitted) =
            transition(self.state, candle, prev_low, &self.params, self.record_marks);

        self.state = next;
        self.previous = Some((candle.timestamp, candle.low));
        self.seen += 1;

        Ok(emitted)
    }
}

/// Scan a full candle sequence, collecting occurrences and marks
pub fn scan(candles: &[Candle], params: &PatternParams) -> Result<ScanOutput, ScanError> {
    let mut scanner = Scanner::new(*params);
    let mut output = ScanOutput::default();

    for candle in candles {
        let emitted = scanner.push(candle)?;
        output.marks.extend(emitted.marks);
        output.occurrences.extend(emitted.occurrence);
    }

    debug!(
        "Scanned {} candles: {} occurrences, {} marks",
        candles.len(),
        output.occurrences.len(),
        output.marks.len()
    );
    Ok(output)
}

/// Scan for occurrences only
pub fn scan_occurrences(
    candles: &[Candle],
    params: &PatternParams,
) -> Result<Vec<Occurrence>, ScanError> {
    let mut scanner = Scanner::without_marks(*params);
    let mut occurrences = Vec::new();

    for candle in candles {
        occurrences.extend(scanner.push(candle)?.occurrence);
    }

    Ok(occurrences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn params() -> PatternParams {
        PatternParams {
            max_price_increase_above_a0: Money::new(dec!(0.50)),
            price_increase_to_confirm_a0: Money::new(dec!(0.05)),
            max_decrease_below_a0: Money::new(dec!(0.20)),
            price_increase_to_confirm_higher_low: Money::new(dec!(0.05)),
            pattern_time_limit_ms: 30 * 60 * 1000,
            take_profit_offset: Money::new(dec!(0.50)),
            stop_loss_offset: Money::new(dec!(0.05)),
            time_to_wait_before_confirm_ax_ms: 5 * 60 * 1000,
            price_increase_from_a2_to_enter_trade: Money::new(dec!(0.02)),
            trade_timeout_ms: 45 * 60 * 1000,
        }
    }

    fn t(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap() + Duration::minutes(min)
    }

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn bar(min: i64, low: &str, close: &str, high: &str) -> Candle {
        Candle::new_unchecked(t(min), m(close), m(high), m(low), m(close))
    }

    fn bars(rows: &[(i64, &str, &str, &str)]) -> Vec<Candle> {
        rows.iter()
            .map(|&(min, low, close, high)| bar(min, low, close, high))
            .collect()
    }

    /// (minute, low, close, high): A0 9.70 @2, A1 9.80 @9, A2 9.90 @15, entry 9.91 @18
    const UP_TO_A0_WAIT: &[(i64, &str, &str, &str)] = &[
        (0, "10.00", "10.10", "10.20"),
        (1, "9.80", "9.82", "9.95"),
        (2, "9.70", "9.72", "9.85"),
        (3, "9.72", "9.80", "9.82"),
        (4, "9.78", "9.85", "9.90"),
        (5, "9.85", "9.90", "9.95"),
        (6, "9.88", "9.92", "9.96"),
        (7, "9.90", "9.95", "10.00"),
    ];

    const A1_LEG: &[(i64, &str, &str, &str)] = &[
        (8, "9.85", "9.86", "9.95"),
        (9, "9.80", "9.82", "9.88"),
        (10, "9.82", "9.86", "9.90"),
        (11, "9.84", "9.90", "9.95"),
        (12, "9.88", "9.95", "10.00"),
        (13, "9.92", "10.00", "10.05"),
        (14, "9.95", "10.02", "10.06"),
    ];

    const A2_LEG_AND_ENTRY: &[(i64, &str, &str, &str)] = &[
        (15, "9.90", "9.91", "10.00"),
        (16, "9.92", "9.96", "9.98"),
        (17, "9.93", "9.94", "9.97"),
        (18, "9.90", "9.91", "9.94"),
    ];

    fn through_entry() -> Vec<Candle> {
        let mut candles = bars(UP_TO_A0_WAIT);
        candles.extend(bars(A1_LEG));
        candles.extend(bars(A2_LEG_AND_ENTRY));
        candles
    }

    fn full_pattern() -> Vec<Candle> {
        let mut candles = through_entry();
        candles.extend(bars(&[
            (19, "9.90", "10.00", "10.10"),
            (20, "10.00", "10.40", "10.45"),
        ]));
        candles
    }

    fn feed(scanner: &mut Scanner, candles: &[Candle]) -> Vec<Emitted> {
        candles.iter().map(|c| scanner.push(c).unwrap()).collect()
    }

    #[test]
    fn test_full_pattern_take_profit() {
        let output = scan(&full_pattern(), &params()).unwrap();

        assert_eq!(output.occurrences.len(), 1);
        let occ = &output.occurrences[0];
        assert_eq!((occ.a0_time, occ.a0_low), (t(2), m("9.70")));
        assert_eq!((occ.a1_time, occ.a1_low), (Some(t(9)), Some(m("9.80"))));
        assert_eq!((occ.a2_time, occ.a2_low), (Some(t(15)), Some(m("9.90"))));
        assert_eq!((occ.entry_time, occ.entry_price), (t(18), m("9.91")));
        assert_eq!((occ.exit_time, occ.exit_price), (t(20), m("10.41")));
        assert_eq!(occ.outcome, Outcome::TakeProfit);
        assert_eq!(occ.profit, m("0.50"));

        let labels: Vec<&str> = output.marks.iter().map(|mk| mk.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["A0?", "A0?", "A0✓", "A1?", "A1?", "A1✓", "A2?", "A2✓", "BUY"]
        );
        let confirm = output.marks[2];
        assert_eq!((confirm.timestamp, confirm.price), (t(3), m("9.80")));
        let buy = output.marks[8];
        assert_eq!((buy.timestamp, buy.price), (t(18), m("9.91")));
    }

    #[test]
    fn test_phases_progress_through_pattern() {
        let mut scanner = Scanner::new(params());
        let candles = through_entry();
        let mut phases = Vec::new();
        for c in &candles {
            scanner.push(c).unwrap();
            phases.push(scanner.state().phase.number());
        }
        assert_eq!(
            phases,
            vec![1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 4, 4, 5]
        );
        assert_eq!(scanner.state().attempt_start, Some(t(18)));
    }

    #[test]
    fn test_flat_series_never_confirms() {
        let candles: Vec<Candle> = (0..60).map(|i| bar(i, "10.00", "10.50", "10.60")).collect();
        let output = scan(&candles, &params()).unwrap();
        assert!(output.occurrences.is_empty());
        assert!(output.marks.is_empty());
    }

    #[test]
    fn test_a0_settles_then_confirms() {
        let candles = bars(&[
            (0, "10", "10", "10.2"),
            (1, "9", "9", "9.2"),
            (2, "8", "8", "8.2"),
            (3, "8.5", "8.10", "8.6"),
        ]);
        let mut scanner = Scanner::new(params());
        let emitted = feed(&mut scanner, &candles);

        assert!(emitted[0].marks.is_empty());
        assert_eq!(emitted[1].marks[0].label, MarkLabel::A0Candidate);
        assert_eq!(emitted[2].marks[0].label, MarkLabel::A0Candidate);
        assert_eq!(emitted[2].marks[0].price, m("8"));
        assert_eq!(emitted[3].marks.len(), 1);
        assert_eq!(emitted[3].marks[0].label, MarkLabel::A0Confirmed);

        match scanner.state().phase {
            Phase::WaitingA0 { a0, confirmed_at } => {
                assert_eq!(a0.low, m("8"));
                assert_eq!(a0.timestamp, t(2));
                assert_eq!(confirmed_at, t(3));
            }
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[test]
    fn test_first_candle_is_never_a_candidate() {
        let output = scan(&bars(&[(0, "5.00", "6.00", "6.00")]), &params()).unwrap();
        assert!(output.marks.is_empty());
    }

    #[test]
    fn test_disruption_resets_without_output() {
        let mut candles = bars(UP_TO_A0_WAIT);
        // 9.70 - 0.20 - 0.01
        candles.push(bar(8, "9.49", "9.50", "9.60"));

        let mut scanner = Scanner::new(params());
        let emitted = feed(&mut scanner, &candles);

        assert_eq!(scanner.state().phase, Phase::START);
        assert_eq!(scanner.state().attempt_start, Some(t(8)));
        assert!(emitted.last().unwrap().marks.is_empty());
        assert!(emitted.iter().all(|e| e.occurrence.is_none()));
    }

    #[test]
    fn test_drop_equal_to_tolerance_is_not_disruption() {
        let mut candles = bars(UP_TO_A0_WAIT);
        candles.push(bar(8, "9.50", "9.51", "9.60"));

        let mut scanner = Scanner::new(params());
        feed(&mut scanner, &candles);

        assert!(matches!(scanner.state().phase, Phase::SeekingA1 { a1: None, .. }));
    }

    #[test]
    fn test_wait_window_lowers_a0_instead_of_disrupting() {
        let mut candles = bars(&UP_TO_A0_WAIT[..4]);
        candles.push(bar(4, "9.40", "9.45", "9.80"));

        let mut scanner = Scanner::new(params());
        let emitted = feed(&mut scanner, &candles);

        let last = emitted.last().unwrap();
        assert_eq!(last.marks.len(), 1);
        assert_eq!(last.marks[0].label, MarkLabel::A0Lowered);
        match scanner.state().phase {
            Phase::WaitingA0 { a0, confirmed_at } => {
                assert_eq!(a0.low, m("9.40"));
                assert_eq!(confirmed_at, t(3));
            }
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[test]
    fn test_no_a1_search_during_wait_window() {
        let mut candles = bars(&UP_TO_A0_WAIT[..6]);
        // candidate in band, but still inside the window
        candles.push(bar(6, "9.75", "9.90", "9.95"));

        let mut scanner = Scanner::new(params());
        let emitted = feed(&mut scanner, &candles);

        assert!(emitted.last().unwrap().marks.is_empty());
        assert!(matches!(scanner.state().phase, Phase::WaitingA0 { .. }));
    }

    #[test]
    fn test_a1_band_excludes_a0_low() {
        let mut candles = bars(UP_TO_A0_WAIT);
        candles.push(bar(8, "9.70", "9.71", "9.80"));

        let mut scanner = Scanner::new(params());
        feed(&mut scanner, &candles);

        assert!(matches!(scanner.state().phase, Phase::SeekingA1 { a1: None, .. }));
    }

    #[test]
    fn test_a1_band_includes_ceiling() {
        let mut candles = bars(&UP_TO_A0_WAIT[..7]);
        candles.push(bar(7, "10.30", "10.31", "10.40"));
        candles.push(bar(8, "10.20", "10.21", "10.30"));

        let mut scanner = Scanner::new(params());
        feed(&mut scanner, &candles);

        match scanner.state().phase {
            Phase::SeekingA1 { a1: Some(a1), .. } => assert_eq!(a1.low, m("10.20")),
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[test]
    fn test_a2_band_is_anchored_to_a0() {
        let mut candles = bars(UP_TO_A0_WAIT);
        candles.extend(bars(&A1_LEG[..3]));
        candles.extend(bars(&[
            (11, "10.00", "10.05", "10.10"),
            (12, "10.20", "10.25", "10.30"),
            (13, "10.35", "10.40", "10.45"),
            (14, "10.40", "10.45", "10.50"),
            // inside A1 + 0.50 = 10.30 but above A0 + 0.50 = 10.20
            (15, "10.25", "10.26", "10.40"),
        ]));

        let mut scanner = Scanner::new(params());
        let emitted = feed(&mut scanner, &candles);

        assert!(emitted.last().unwrap().marks.is_empty());
        match scanner.state().phase {
            Phase::SeekingA2 { a0, a1, a2 } => {
                assert_eq!(a0.low, m("9.70"));
                assert_eq!(a1.low, m("9.80"));
                assert_eq!(a2, None);
            }
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[test]
    fn test_wait_window_lowers_a1() {
        let mut candles = bars(UP_TO_A0_WAIT);
        candles.extend(bars(&A1_LEG[..3]));
        candles.push(bar(11, "9.75", "9.80", "9.90"));

        let mut scanner = Scanner::new(params());
        let emitted = feed(&mut scanner, &candles);

        assert_eq!(emitted.last().unwrap().marks[0].label, MarkLabel::A1Lowered);
        match scanner.state().phase {
            Phase::WaitingA1 { a1, .. } => assert_eq!(a1.low, m("9.75")),
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[test]
    fn test_disruption_before_entry() {
        let mut candles = bars(UP_TO_A0_WAIT);
        candles.extend(bars(A1_LEG));
        candles.extend(bars(&A2_LEG_AND_ENTRY[..2]));
        candles.push(bar(17, "9.49", "9.95", "9.96"));

        let output = scan(&candles, &params()).unwrap();
        assert!(output.occurrences.is_empty());
        assert!(output.marks.iter().all(|mk| mk.label != MarkLabel::Buy));

        let mut scanner = Scanner::new(params());
        feed(&mut scanner, &candles);
        assert_eq!(scanner.state().phase, Phase::START);
    }

    #[test]
    fn test_timeout_exit() {
        let params = PatternParams {
            pattern_time_limit_ms: 60 * 60 * 1000,
            ..params()
        };
        let mut candles = through_entry();
        candles.extend(bars(&[
            (19, "9.90", "9.95", "10.00"),
            (40, "9.90", "9.97", "10.00"),
            (63, "9.90", "9.95", "10.00"),
        ]));

        let output = scan(&candles, &params).unwrap();
        assert_eq!(output.occurrences.len(), 1);
        let occ = &output.occurrences[0];
        assert_eq!(occ.outcome, Outcome::Timeout);
        assert_eq!(occ.exit_time, t(63));
        assert_eq!(occ.exit_price, m("9.95"));
        assert_eq!(occ.profit, m("0.04"));
    }

    #[test]
    fn test_stop_loss_exit() {
        let mut candles = through_entry();
        candles.push(bar(19, "9.85", "9.87", "9.95"));

        let output = scan(&candles, &params()).unwrap();
        let occ = &output.occurrences[0];
        assert_eq!(occ.outcome, Outcome::StopLoss);
        assert_eq!(occ.exit_price, m("9.86"));
        assert_eq!(occ.profit, m("-0.05"));
    }

    #[test]
    fn test_time_limit_restarts_and_candle_still_counts() {
        let candles = bars(&[
            (0, "10.00", "10.00", "10.10"),
            (1, "9.80", "9.81", "9.90"),
            // would confirm A0 9.80, but the 30 minute budget has run out
            (32, "9.90", "9.91", "9.95"),
            (33, "9.85", "9.86", "9.90"),
        ]);

        let mut scanner = Scanner::new(params());
        let emitted = feed(&mut scanner, &candles);

        assert!(emitted[2].marks.is_empty());
        assert_eq!(emitted[3].marks[0].label, MarkLabel::A0Candidate);
        match scanner.state().phase {
            Phase::SeekingA0 { a0: Some(a0) } => assert_eq!(a0.low, m("9.85")),
            other => panic!("unexpected phase {other:?}"),
        }
        assert_eq!(scanner.state().attempt_start, Some(t(32)));
    }

    #[test]
    fn test_time_limit_is_strict() {
        let candles = bars(&[
            (0, "10.00", "10.00", "10.10"),
            (1, "9.80", "9.81", "9.90"),
            (30, "9.90", "9.91", "9.95"),
        ]);

        let output = scan(&candles, &params()).unwrap();
        assert_eq!(output.marks.last().unwrap().label, MarkLabel::A0Confirmed);
    }

    #[test]
    fn test_time_limit_abandons_open_trade() {
        let params = PatternParams {
            pattern_time_limit_ms: 10 * 60 * 1000,
            ..params()
        };
        let mut candles = through_entry();
        candles.push(bar(29, "9.90", "9.95", "10.00"));

        let mut scanner = Scanner::new(params);
        let emitted = feed(&mut scanner, &candles);

        assert!(emitted.iter().all(|e| e.occurrence.is_none()));
        assert_eq!(scanner.state().phase, Phase::START);
    }

    #[test]
    fn test_back_to_back_patterns() {
        let mut candles = full_pattern();
        let second: Vec<Candle> = full_pattern()
            .into_iter()
            .map(|mut c| {
                c.timestamp = c.timestamp + Duration::minutes(21);
                c
            })
            .collect();
        candles.extend(second);

        let occurrences = scan_occurrences(&candles, &params()).unwrap();
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0].entry_time, t(18));
        assert_eq!(occurrences[1].entry_time, t(39));
        assert!(occurrences.iter().all(|o| o.outcome == Outcome::TakeProfit));
    }

    #[test]
    fn test_scan_is_idempotent() {
        let candles = full_pattern();
        let first = scan(&candles, &params()).unwrap();
        let second = scan(&candles, &params()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_occurrences_only_scan_matches() {
        let candles = full_pattern();
        let full = scan(&candles, &params()).unwrap();
        assert_eq!(scan_occurrences(&candles, &params()).unwrap(), full.occurrences);

        let mut quiet = Scanner::without_marks(params());
        assert!(feed(&mut quiet, &candles).iter().all(|e| e.marks.is_empty()));
    }

    #[test]
    fn test_empty_input() {
        let output = scan(&[], &params()).unwrap();
        assert_eq!(output, ScanOutput::default());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let candles = bars(&[
            (0, "10.00", "10.00", "10.10"),
            (2, "9.80", "9.81", "9.90"),
            (1, "9.70", "9.71", "9.80"),
        ]);

        let err = scan(&candles, &params()).unwrap_err();
        assert_eq!(
            err,
            ScanError::OutOfOrder {
                index: 2,
                timestamp: t(1),
                previous: t(2),
            }
        );

        let mut scanner = Scanner::new(params());
        scanner.push(&candles[0]).unwrap();
        scanner.push(&candles[1]).unwrap();
        let before = *scanner.state();
        assert!(scanner.push(&candles[2]).is_err());
        assert_eq!(*scanner.state(), before);
    }

    #[test]
    fn test_equal_timestamps_accepted() {
        let candles = bars(&[
            (0, "10.00", "10.00", "10.10"),
            (0, "9.80", "9.81", "9.90"),
        ]);
        let output = scan(&candles, &params()).unwrap();
        assert_eq!(output.marks.len(), 1);
    }

    #[test]
    fn test_step_is_pure() {
        let candles = full_pattern();
        let mut state = AttemptState::new();
        let mut prev_low = None;
        let mut occurrences = Vec::new();
        for c in &candles {
            let (a, first) = step(state, c, prev_low, &params());
            let (b, second) = step(state, c, prev_low, &params());
            assert_eq!(a, b);
            assert_eq!(first, second);
            occurrences.extend(first.occurrence);
            state = a;
            prev_low = Some(c.low);
        }
        assert_eq!(occurrences, scan_occurrences(&candles, &params()).unwrap());
    }

    #[test]
    fn test_zero_tolerance_disrupts_on_any_lower_low() {
        let params = PatternParams {
            max_decrease_below_a0: Money::ZERO,
            ..params()
        };
        let mut candles = bars(UP_TO_A0_WAIT);
        candles.push(bar(8, "9.69", "9.70", "9.80"));

        let mut scanner = Scanner::new(params);
        feed(&mut scanner, &candles);
        assert_eq!(scanner.state().phase, Phase::START);
    }

    #[test]
    fn test_mark_serialization() {
        let mark = Mark {
            timestamp: t(0),
            price: m("9.70"),
            label: MarkLabel::A0Confirmed,
        };
        let json = serde_json::to_value(mark).unwrap();
        assert_eq!(json["label"], "A0✓");
        assert_eq!(json["price"], "9.70");
    }
}
