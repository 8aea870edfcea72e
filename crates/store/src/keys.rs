//! Persisted key space. Changing any of these breaks existing databases.

use beacon_core::ids::ErrorHash;
use beacon_core::model::analytics::RawEventKind;
use beacon_core::time::format_date;
use chrono::NaiveDate;

use crate::key::{Key, key};

pub fn services() -> Key {
    key!["services"]
}

pub fn service_info(service: &str) -> Key {
    key![service, "info"]
}

pub fn counter(service: &str, counter: &str, date: NaiveDate, dimension: &str) -> Key {
    key![service, "counters", counter, format_date(date), dimension]
}

pub fn counters_for_date(service: &str, counter: &str, date: NaiveDate) -> Key {
    key![service, "counters", counter, format_date(date)]
}

pub const COUNTER_DIMENSION_IDX: usize = 4;

pub fn span(service: &str, ts_ms: i64, span_id: &str) -> Key {
    key![service, "spans", ts_ms, span_id]
}

pub fn spans(service: &str) -> Key {
    key![service, "spans"]
}

pub fn error(service: &str, hash: &ErrorHash) -> Key {
    key![service, "errors", hash.as_str()]
}

pub fn error_by_time(service: &str, ts_ms: i64) -> Key {
    key![service, "errors_by_time", ts_ms]
}

pub fn errors_by_time(service: &str) -> Key {
    key![service, "errors_by_time"]
}

pub fn raw_event(domain: &str, kind: RawEventKind, ts_ms: i64) -> Key {
    key![domain, "events", kind.as_str(), ts_ms]
}

pub fn raw_events(domain: &str, kind: RawEventKind) -> Key {
    key![domain, "events", kind.as_str()]
}

pub const RAW_EVENT_TS_IDX: usize = 3;

pub fn daily_stats(domain: &str, date: NaiveDate) -> Key {
    key![domain, "stats", "daily", format_date(date)]
}

pub fn all_daily_stats(domain: &str) -> Key {
    key![domain, "stats", "daily"]
}

pub fn session(domain: &str, date: NaiveDate, session_id: &str) -> Key {
    key![domain, "sessions", format_date(date), session_id]
}

pub fn sessions_for_date(domain: &str, date: NaiveDate) -> Key {
    key![domain, "sessions", format_date(date)]
}
