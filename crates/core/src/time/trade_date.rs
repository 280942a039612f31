use crate::domain::HistoryIndex;
use chrono::{Datelike, Duration, NaiveDate};

// Enough to bridge a weekend plus a holiday cluster without a market calendar.
pub const LOOKBACK_DAYS: i64 = 7;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

/// Closest date strictly before `date` that exists in the history, looking back at most
/// `LOOKBACK_DAYS` calendar days.
pub fn previous_trade_date(date: NaiveDate, index: &HistoryIndex<'_>) -> Option<NaiveDate> {
    (1..=LOOKBACK_DAYS)
        .map(|back| date - Duration::days(back))
        .find(|candidate| index.contains(*candidate))
}

/// Next weekday after `date`. Holidays are not considered.
pub fn next_trade_date(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while is_weekend(next) {
        next = next + Duration::days(1);
    }
    next
}
