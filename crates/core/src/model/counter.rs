use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CounterValue {
    pub count: u64,
    pub last_updated: i64,
}

/// One point of a per-day counter series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateCount {
    pub date: NaiveDate,
    pub count: u64,
}
