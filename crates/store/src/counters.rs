use std::collections::BTreeMap;

use beacon_core::error::Result;
use beacon_core::model::counter::{CounterValue, DateCount};
use beacon_core::time::{date_bucket, days_between};
use chrono::NaiveDate;
use tracing::debug;

use crate::Store;
use crate::keys::{self, COUNTER_DIMENSION_IDX};
use crate::kv::ScanOptions;

impl Store {
    /// Adds `delta` to the counter for the UTC day of `ts_ms`.
    ///
    /// Concurrent increments on one key never lose an update; contention
    /// beyond the retry budget fails with `ResourceExhausted`.
    pub fn increment_counter(
        &self,
        service: &str,
        counter: &str,
        dimension: &str,
        ts_ms: i64,
        delta: u64,
    ) -> Result<CounterValue> {
        self.register_service(service)?;

        let date = date_bucket(ts_ms);
        let key = keys::counter(service, counter, date, dimension);
        let updated = self.update_with_retry::<CounterValue, _>(&key, None, |current| {
            Some(CounterValue {
                count: current.map(|c| c.count).unwrap_or(0) + delta,
                last_updated: ts_ms,
            })
        })?;

        let value = updated.unwrap_or_default();
        debug!(service, counter, dimension, %date, count = value.count, "counter incremented");
        Ok(value)
    }

    pub fn get_counter(
        &self,
        service: &str,
        counter: &str,
        date: NaiveDate,
        dimension: &str,
    ) -> Result<Option<CounterValue>> {
        Ok(self
            .get_value::<CounterValue>(&keys::counter(service, counter, date, dimension))?
            .map(|v| v.value))
    }

    /// Per-day totals summed over every dimension, ascending by date.
    /// Days without data are left out; `start > end` yields nothing.
    pub fn get_totals_by_date_range(
        &self,
        service: &str,
        counter: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateCount>> {
        Ok(self
            .get_counter_breakdown(service, counter, start, end)?
            .into_iter()
            .map(|(date, dims)| DateCount {
                date,
                count: dims.values().sum(),
            })
            .collect())
    }

    /// date -> dimension -> count over the inclusive range.
    pub fn get_counter_breakdown(
        &self,
        service: &str,
        counter: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, BTreeMap<String, u64>>> {
        let mut out = BTreeMap::new();
        for date in days_between(start, end) {
            let prefix = keys::counters_for_date(service, counter, date);
            let rows = self.scan_values::<CounterValue>(&prefix, ScanOptions::forward())?;
            if rows.is_empty() {
                continue;
            }

            let dims = rows
                .into_iter()
                .map(|(key, value)| {
                    let dimension = key.str_at(COUNTER_DIMENSION_IDX).unwrap_or_default();
                    (dimension.to_string(), value.count)
                })
                .collect::<BTreeMap<_, _>>();
            out.insert(date, dims);
        }
        Ok(out)
    }
}
