use std::collections::BTreeMap;

use beacon_core::error::Result;
use beacon_core::model::analytics::{
    BrowserEvent, DailyStats, ErrorEvent, RawEvent, RawEventKind, ServerEvent,
};
use beacon_core::time::date_bucket;
use chrono::NaiveDate;
use tracing::debug;

use crate::Store;
use crate::key::Key;
use crate::keys::{self, RAW_EVENT_TS_IDX};
use crate::kv::ScanOptions;

/// Stats for one day computed from raw events, plus the raw keys they came from.
#[derive(Debug, Clone)]
pub(crate) struct DayPartial {
    pub stats: DailyStats,
    pub raw_keys: Vec<Key>,
}

impl Store {
    /// Stores a page view. A session id also marks the session as seen on the
    /// event's day; markers are never deleted.
    pub fn save_browser_event(&self, event: &BrowserEvent) -> Result<()> {
        let key = keys::raw_event(&event.domain, RawEventKind::Browser, event.timestamp);
        self.put_value(&key, event, None)?;
        if let Some(session_id) = event.session_id.as_deref().filter(|s| !s.is_empty()) {
            let marker = keys::session(&event.domain, date_bucket(event.timestamp), session_id);
            self.put_value(&marker, &true, None)?;
        }
        debug!(domain = %event.domain, ts = event.timestamp, "browser event stored");
        Ok(())
    }

    pub fn save_server_event(&self, event: &ServerEvent) -> Result<()> {
        let key = keys::raw_event(&event.domain, RawEventKind::Server, event.timestamp);
        self.put_value(&key, event, None)?;
        debug!(domain = %event.domain, ts = event.timestamp, "server event stored");
        Ok(())
    }

    pub fn save_error_event(&self, event: &ErrorEvent) -> Result<()> {
        let key = keys::raw_event(&event.domain, RawEventKind::Error, event.timestamp);
        self.put_value(&key, event, None)?;
        debug!(domain = %event.domain, ts = event.timestamp, "error event stored");
        Ok(())
    }

    /// Newest raw events of one kind. Events already rolled up are gone.
    pub fn get_recent_events(
        &self,
        domain: &str,
        kind: RawEventKind,
        limit: usize,
    ) -> Result<Vec<RawEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let prefix = keys::raw_events(domain, kind);
        let opts = ScanOptions::reverse().limit(limit);
        let events = match kind {
            RawEventKind::Browser => self
                .scan_values::<BrowserEvent>(&prefix, opts)?
                .into_iter()
                .map(|(_, e)| RawEvent::Browser(e))
                .collect(),
            RawEventKind::Server => self
                .scan_values::<ServerEvent>(&prefix, opts)?
                .into_iter()
                .map(|(_, e)| RawEvent::Server(e))
                .collect(),
            RawEventKind::Error => self
                .scan_values::<ErrorEvent>(&prefix, opts)?
                .into_iter()
                .map(|(_, e)| RawEvent::Error(e))
                .collect(),
        };
        Ok(events)
    }

    pub fn get_daily_stats(&self, domain: &str, date: NaiveDate) -> Result<Option<DailyStats>> {
        Ok(self
            .get_value::<DailyStats>(&keys::daily_stats(domain, date))?
            .map(|v| v.value))
    }

    pub fn save_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        self.put_value(&keys::daily_stats(&stats.domain, stats.date), stats, None)
    }

    /// Stored rollups, newest day first, at most `days` rows.
    pub fn get_daily_stats_range(&self, domain: &str, days: usize) -> Result<Vec<DailyStats>> {
        if days == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .scan_values::<DailyStats>(
                &keys::all_daily_stats(domain),
                ScanOptions::reverse().limit(days),
            )?
            .into_iter()
            .map(|(_, stats)| stats)
            .collect())
    }

    /// Aggregates the raw events still stored for `date`, without touching
    /// the rollup row. Used for days inside the retention window.
    pub fn compute_live_daily_stats(&self, domain: &str, date: NaiveDate) -> Result<DailyStats> {
        let mut partials = self.partial_daily_stats(domain, |ts| date_bucket(ts) == date)?;
        Ok(partials
            .remove(&date)
            .map(|p| p.stats)
            .unwrap_or_else(|| DailyStats::empty(domain, date)))
    }

    /// Groups raw events whose timestamp passes `include` by UTC day.
    pub(crate) fn partial_daily_stats(
        &self,
        domain: &str,
        include: impl Fn(i64) -> bool,
    ) -> Result<BTreeMap<NaiveDate, DayPartial>> {
        let mut days: BTreeMap<NaiveDate, DayPartial> = BTreeMap::new();

        for key in self.scan_keys(&keys::raw_events(domain, RawEventKind::Browser), ScanOptions::forward())? {
            let Some(ts) = key.int_at(RAW_EVENT_TS_IDX).filter(|ts| include(*ts)) else {
                continue;
            };
            let partial = day_entry(&mut days, domain, ts);
            partial.stats.page_views += 1;
            partial.raw_keys.push(key);
        }

        for (key, event) in self.scan_values::<ServerEvent>(
            &keys::raw_events(domain, RawEventKind::Server),
            ScanOptions::forward(),
        )? {
            let Some(ts) = key.int_at(RAW_EVENT_TS_IDX).filter(|ts| include(*ts)) else {
                continue;
            };
            let partial = day_entry(&mut days, domain, ts);
            partial.stats.record_server_request(event.duration_ms);
            partial.raw_keys.push(key);
        }

        for key in self.scan_keys(&keys::raw_events(domain, RawEventKind::Error), ScanOptions::forward())? {
            let Some(ts) = key.int_at(RAW_EVENT_TS_IDX).filter(|ts| include(*ts)) else {
                continue;
            };
            let partial = day_entry(&mut days, domain, ts);
            partial.stats.errors += 1;
            partial.raw_keys.push(key);
        }

        for (date, partial) in days.iter_mut() {
            partial.stats.unique_sessions = self
                .scan_keys(&keys::sessions_for_date(domain, *date), ScanOptions::forward())?
                .len() as u64;
        }
        Ok(days)
    }
}

fn day_entry<'a>(
    days: &'a mut BTreeMap<NaiveDate, DayPartial>,
    domain: &str,
    ts: i64,
) -> &'a mut DayPartial {
    let date = date_bucket(ts);
    days.entry(date).or_insert_with(|| DayPartial {
        stats: DailyStats::empty(domain, date),
        raw_keys: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use beacon_core::model::analytics::{RawEvent, RawEventKind};
    use beacon_core::time::parse_date;
    use testkit::{DOMAIN, base_ms, browser_event, error_event, server_event};

    use crate::Store;

    #[test]
    fn live_stats_cover_one_day() {
        let store = Store::memory();
        let day = parse_date("2024-01-01").unwrap();
        store
            .save_browser_event(&browser_event(base_ms(), "/", Some("s1")))
            .unwrap();
        store
            .save_browser_event(&browser_event(base_ms() + 1, "/about", Some("s1")))
            .unwrap();
        store
            .save_browser_event(&browser_event(base_ms() + 2, "/", Some("s2")))
            .unwrap();
        store
            .save_server_event(&server_event(base_ms() + 3, "/api", 10.0))
            .unwrap();
        store
            .save_server_event(&server_event(base_ms() + 4, "/api", 30.0))
            .unwrap();
        store.save_error_event(&error_event(base_ms() + 5, "boom")).unwrap();
        // next day, excluded
        store
            .save_browser_event(&browser_event(base_ms() + 86_400_000, "/", Some("s3")))
            .unwrap();

        let stats = store.compute_live_daily_stats(DOMAIN, day).unwrap();
        assert_eq!(stats.page_views, 3);
        assert_eq!(stats.unique_sessions, 2);
        assert_eq!(stats.server_requests, 2);
        assert_eq!(stats.errors, 1);
        assert!((stats.avg_duration_ms - 20.0).abs() < 1e-9);

        // live aggregation leaves the raw rows alone
        assert_eq!(
            store.get_recent_events(DOMAIN, RawEventKind::Browser, 10).unwrap().len(),
            4
        );
        assert!(store.get_daily_stats(DOMAIN, day).unwrap().is_none());
    }

    #[test]
    fn recent_events_are_newest_first_and_typed() {
        let store = Store::memory();
        store.save_error_event(&error_event(base_ms(), "first")).unwrap();
        store.save_error_event(&error_event(base_ms() + 9, "second")).unwrap();

        let events = store.get_recent_events(DOMAIN, RawEventKind::Error, 1).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RawEvent::Error(e) if e.message == "second"));
        assert_eq!(events[0].timestamp(), base_ms() + 9);
    }

    #[test]
    fn same_millisecond_events_overwrite() {
        let store = Store::memory();
        store
            .save_browser_event(&browser_event(base_ms(), "/a", None))
            .unwrap();
        store
            .save_browser_event(&browser_event(base_ms(), "/b", None))
            .unwrap();

        let events = store.get_recent_events(DOMAIN, RawEventKind::Browser, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RawEvent::Browser(e) if e.url == "/b"));
    }

    #[test]
    fn empty_day_has_zero_stats() {
        let store = Store::memory();
        let day = parse_date("2024-02-02").unwrap();
        let stats = store.compute_live_daily_stats(DOMAIN, day).unwrap();
        assert_eq!(stats.page_views, 0);
        assert_eq!(stats.avg_duration_ms, 0.0);
    }
}
