//! US equity session calendar
//!
//! Only weekends are treated as closed; exchange holidays are not modelled.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;

const SESSION_OPEN: (u32, u32) = (9, 0);
const SESSION_CLOSE: (u32, u32) = (16, 30);

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// True on weekdays between 09:00 and 16:30 New York time
pub fn is_market_hours(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&New_York);
    if is_weekend(local.date_naive()) {
        return false;
    }

    let time = local.time();
    let open = NaiveTime::from_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, 0).unwrap_or(NaiveTime::MIN);
    let close =
        NaiveTime::from_hms_opt(SESSION_CLOSE.0, SESSION_CLOSE.1, 0).unwrap_or(NaiveTime::MIN);
    time >= open && time <= close
}

/// The most recent weekday on or before `date`
pub fn last_trading_day(date: NaiveDate) -> NaiveDate {
    let mut day = date;
    while is_weekend(day) {
        day -= Duration::days(1);
    }
    day
}

/// New York calendar date of `now`
pub fn market_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&New_York).date_naive()
}

/// Session to scan when none is named: today while the market is open,
/// otherwise the last trading day
pub fn default_session(now: DateTime<Utc>) -> NaiveDate {
    let today = market_date(now);
    if is_market_hours(now) {
        today
    } else {
        last_trading_day(today)
    }
}
