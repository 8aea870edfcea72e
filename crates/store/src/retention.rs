use beacon_core::error::{BeaconError, Result};
use beacon_core::query::RollupReport;
use beacon_core::time::now_ms;
use tracing::{info, warn};

use crate::Store;

impl Store {
    pub fn aggregate_and_cleanup(&self, domain: &str) -> Result<RollupReport> {
        self.aggregate_and_cleanup_at(domain, now_ms())
    }

    /// Folds raw events older than the retention window into per-day stats,
    /// then deletes them.
    ///
    /// A day's raw events are only deleted after its stats row is written. A
    /// day whose write or deletes fail lands in `failed_dates` and the
    /// remaining days are still processed. Two concurrent runs over
    /// one domain double count; callers serialize them.
    pub fn aggregate_and_cleanup_at(&self, domain: &str, now: i64) -> Result<RollupReport> {
        let window = i64::try_from(self.options().retention_window.as_millis())
            .map_err(|e| BeaconError::Internal(format!("retention window out of range: {e}")))?;
        let cutoff_ms = now.saturating_sub(window);

        let partials = self.partial_daily_stats(domain, |ts| ts < cutoff_ms)?;
        let mut report = RollupReport {
            domain: domain.to_string(),
            cutoff_ms,
            ..RollupReport::default()
        };

        for (date, partial) in partials {
            let merged = match self.get_daily_stats(domain, date) {
                Ok(Some(mut stored)) => {
                    stored.merge(&partial.stats);
                    stored
                }
                Ok(None) => partial.stats,
                Err(e) => {
                    warn!(domain, %date, error = %e, "failed to read daily stats, keeping raw events");
                    report.failed_dates.push(date);
                    continue;
                }
            };

            if let Err(e) = self.save_daily_stats(&merged) {
                warn!(domain, %date, error = %e, "failed to write daily stats, keeping raw events");
                report.failed_dates.push(date);
                continue;
            }

            let mut delete_failures = 0;
            let mut last_error = None;
            for key in &partial.raw_keys {
                match self.delete_key(key) {
                    Ok(true) => report.events_deleted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        delete_failures += 1;
                        last_error = Some(e);
                    }
                }
            }
            if let Some(e) = last_error {
                // the stats row already counts these, a later pass counts them again
                warn!(domain, %date, left = delete_failures, error = %e, "failed to delete raw events after rollup");
                report.failed_dates.push(date);
                continue;
            }
            report.dates_rolled.push(date);
        }

        info!(
            domain,
            cutoff_ms,
            rolled = report.dates_rolled.len(),
            failed = report.failed_dates.len(),
            deleted = report.events_deleted,
            "rollup finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use beacon_core::model::analytics::RawEventKind;
    use beacon_core::time::parse_date;
    use testkit::{DOMAIN, base_ms, browser_event, error_event, server_event};

    use crate::keys;
    use crate::kv::MemoryKv;
    use crate::test_support::{FailOn, FailingKeyKv};
    use crate::Store;

    const DAY_MS: i64 = 86_400_000;

    fn seed(store: &Store) {
        for (i, session) in ["a", "a", "b"].into_iter().enumerate() {
            store
                .save_browser_event(&browser_event(base_ms() + i as i64, "/", Some(session)))
                .unwrap();
        }
        store
            .save_server_event(&server_event(base_ms() + 10, "/api", 40.0))
            .unwrap();
        store.save_error_event(&error_event(base_ms() + 20, "boom")).unwrap();
        store
            .save_browser_event(&browser_event(base_ms() + DAY_MS, "/", Some("c")))
            .unwrap();
    }

    fn remaining_raw(store: &Store) -> usize {
        RawEventKind::ALL
            .into_iter()
            .map(|kind| store.get_recent_events(DOMAIN, kind, 100).unwrap().len())
            .sum()
    }

    #[test]
    fn rolls_up_old_days_and_is_idempotent() {
        let store = Store::memory();
        seed(&store);
        let now = base_ms() + 40 * DAY_MS;

        let report = store.aggregate_and_cleanup_at(DOMAIN, now).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.dates_rolled.len(), 2);
        assert_eq!(report.events_deleted, 6);
        assert_eq!(remaining_raw(&store), 0);

        let day = parse_date("2024-01-01").unwrap();
        let stats = store.get_daily_stats(DOMAIN, day).unwrap().unwrap();
        assert_eq!(stats.page_views, 3);
        assert_eq!(stats.unique_sessions, 2);
        assert_eq!(stats.server_requests, 1);
        assert_eq!(stats.errors, 1);
        assert!((stats.avg_duration_ms - 40.0).abs() < 1e-9);

        let again = store.aggregate_and_cleanup_at(DOMAIN, now).unwrap();
        assert!(again.dates_rolled.is_empty());
        assert_eq!(again.events_deleted, 0);
        assert_eq!(store.get_daily_stats(DOMAIN, day).unwrap().unwrap(), stats);

        let range = store.get_daily_stats_range(DOMAIN, 10).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].date, parse_date("2024-01-02").unwrap());
    }

    #[test]
    fn recent_events_stay_raw() {
        let store = Store::memory();
        seed(&store);
        // cutoff falls between the two seeded days
        let now = base_ms() + DAY_MS / 2 + 30 * DAY_MS;

        let report = store.aggregate_and_cleanup_at(DOMAIN, now).unwrap();
        assert_eq!(report.dates_rolled, vec![parse_date("2024-01-01").unwrap()]);
        assert_eq!(remaining_raw(&store), 1);
    }

    #[test]
    fn later_rollups_merge_into_existing_rows() {
        let store = Store::memory();
        let now = base_ms() + 40 * DAY_MS;
        store
            .save_server_event(&server_event(base_ms(), "/api", 10.0))
            .unwrap();
        store.aggregate_and_cleanup_at(DOMAIN, now).unwrap();

        // a late arrival for the same day
        store
            .save_server_event(&server_event(base_ms() + 5, "/api", 30.0))
            .unwrap();
        store
            .save_browser_event(&browser_event(base_ms() + 6, "/", Some("s")))
            .unwrap();
        store.aggregate_and_cleanup_at(DOMAIN, now).unwrap();

        let stats = store
            .get_daily_stats(DOMAIN, parse_date("2024-01-01").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stats.server_requests, 2);
        assert_eq!(stats.page_views, 1);
        assert_eq!(stats.unique_sessions, 1);
        assert!((stats.avg_duration_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn failed_stats_write_keeps_raw_events() {
        let day = parse_date("2024-01-01").unwrap();
        let kv = Arc::new(FailingKeyKv {
            inner: MemoryKv::new(),
            poisoned_key: keys::daily_stats(DOMAIN, day).encode(),
            fail_on: FailOn::Set,
        });
        let store = Store::with_kv(kv);
        seed(&store);

        let report = store
            .aggregate_and_cleanup_at(DOMAIN, base_ms() + 40 * DAY_MS)
            .unwrap();
        assert_eq!(report.failed_dates, vec![day]);
        assert_eq!(report.dates_rolled, vec![parse_date("2024-01-02").unwrap()]);
        assert!(!report.is_clean());
        assert_eq!(remaining_raw(&store), 5);
        assert!(store.get_daily_stats(DOMAIN, day).unwrap().is_none());
    }

    #[test]
    fn failed_raw_delete_marks_day_and_continues() {
        let day = parse_date("2024-01-01").unwrap();
        let kv = Arc::new(FailingKeyKv {
            inner: MemoryKv::new(),
            poisoned_key: keys::raw_event(DOMAIN, RawEventKind::Server, base_ms() + 10).encode(),
            fail_on: FailOn::Delete,
        });
        let store = Store::with_kv(kv);
        seed(&store);

        let report = store
            .aggregate_and_cleanup_at(DOMAIN, base_ms() + 40 * DAY_MS)
            .unwrap();
        assert_eq!(report.failed_dates, vec![day]);
        assert_eq!(report.dates_rolled, vec![parse_date("2024-01-02").unwrap()]);
        assert_eq!(report.events_deleted, 5);
        assert!(!report.is_clean());
        assert_eq!(remaining_raw(&store), 1);
        assert!(store.get_daily_stats(DOMAIN, parse_date("2024-01-02").unwrap()).unwrap().is_some());
    }

    #[test]
    fn rollup_on_duckdb_backend() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);
        let report = store
            .aggregate_and_cleanup_at(DOMAIN, base_ms() + 40 * DAY_MS)
            .unwrap();
        assert_eq!(report.events_deleted, 6);
        assert_eq!(remaining_raw(&store), 0);
    }
}
