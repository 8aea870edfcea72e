use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::error::{BeaconError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn nanos_to_millis(nanos: u64) -> i64 {
    (nanos / 1_000_000) as i64
}

/// UTC calendar day a millisecond timestamp falls on.
pub fn date_bucket(ts_ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, DATE_FORMAT)
        .map_err(|e| BeaconError::Parse(format!("invalid date {input}: {e}")))
}

/// Accepts `YYYY-MM-DD` or a duration such as `7d`, counted back from `today`.
pub fn parse_date_or_relative(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    if let Ok(date) = parse_date(input) {
        return Ok(date);
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let days = duration.as_secs() / 86_400;
        return today
            .checked_sub_days(Days::new(days))
            .ok_or_else(|| BeaconError::Parse(format!("date out of range: {input}")));
    }

    Err(BeaconError::Parse(format!(
        "expected YYYY-MM-DD or duration, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| BeaconError::Parse(format!("invalid duration {input}: {e}")))
}

/// Inclusive day range; empty when `start > end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_by_utc_day() {
        // 2024-01-01T23:59:59.999Z and the next millisecond
        assert_eq!(format_date(date_bucket(1_704_153_599_999)), "2024-01-01");
        assert_eq!(format_date(date_bucket(1_704_153_600_000)), "2024-01-02");
    }

    #[test]
    fn parses_relative_dates() {
        let today = parse_date("2024-03-10").unwrap();
        assert_eq!(
            parse_date_or_relative("7d", today).unwrap(),
            parse_date("2024-03-03").unwrap()
        );
        assert_eq!(
            parse_date_or_relative("2024-01-05", today).unwrap(),
            parse_date("2024-01-05").unwrap()
        );
        assert!(parse_date_or_relative("nope", today).is_err());
    }

    #[test]
    fn day_range_is_inclusive() {
        let start = parse_date("2024-02-28").unwrap();
        let end = parse_date("2024-03-01").unwrap();
        let days = days_between(start, end).map(format_date).collect::<Vec<_>>();
        assert_eq!(days, vec!["2024-02-28", "2024-02-29", "2024-03-01"]);
        assert_eq!(days_between(end, start).count(), 0);
    }
}
