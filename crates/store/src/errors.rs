use std::collections::HashSet;

use beacon_core::error::Result;
use beacon_core::ids::ErrorHash;
use beacon_core::model::exception::{ErrorRecord, ExceptionEvent};
use beacon_core::model::span::Span;
use tracing::{debug, info};

use crate::Store;
use crate::keys;
use crate::kv::ScanOptions;

impl Store {
    /// Records one occurrence of `exception` raised inside `span`.
    ///
    /// Occurrences sharing type, message and top stack frame collapse into one
    /// record. The upsert is a plain read-modify-write, so two writers racing
    /// on the same hash can drop an increment.
    ///
    /// The time index holds one hash per millisecond. A different error in the
    /// same millisecond replaces the earlier entry, and the earlier record is
    /// then unreachable from the index: `get_recent_errors` skips it and
    /// `cleanup_old_errors` never evicts it.
    pub fn store_error(
        &self,
        service: &str,
        span: &Span,
        exception: &ExceptionEvent,
    ) -> Result<ErrorRecord> {
        self.register_service(service)?;

        let hash = ErrorHash::of(exception);
        let ts_ms = span.start_ms();
        let key = keys::error(service, &hash);

        let record = match self.get_value::<ErrorRecord>(&key)? {
            Some(existing) => {
                let mut record = existing.value;
                record.record_occurrence(&span.span_id, ts_ms, self.options().error_span_capacity);
                record
            }
            None => ErrorRecord::first_occurrence(service, hash.clone(), exception, &span.span_id, ts_ms),
        };
        self.put_value(&key, &record, None)?;
        self.put_value(&keys::error_by_time(service, ts_ms), &hash, None)?;

        debug!(service, error_hash = %hash, count = record.count, "error recorded");
        self.cleanup_old_errors(service, self.options().error_keep_count)?;
        Ok(record)
    }

    pub fn get_error(&self, service: &str, hash: &ErrorHash) -> Result<Option<ErrorRecord>> {
        Ok(self
            .get_value::<ErrorRecord>(&keys::error(service, hash))?
            .map(|v| v.value))
    }

    /// Up to `limit` distinct errors, most recently seen first. Only the newest
    /// `limit * 3` index entries are consulted, so bursts of one error can make
    /// this return fewer.
    pub fn get_recent_errors(&self, service: &str, limit: usize) -> Result<Vec<ErrorRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let entries = self.scan_values::<ErrorHash>(
            &keys::errors_by_time(service),
            ScanOptions::reverse().limit(limit.saturating_mul(3)),
        )?;

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(limit);
        for (_, hash) in entries {
            if out.len() >= limit {
                break;
            }
            if !seen.insert(hash.clone()) {
                continue;
            }
            if let Some(record) = self.get_error(service, &hash)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Keeps the `keep` most recently seen distinct errors. Older records and
    /// every index entry pointing at them are deleted. Returns how many
    /// records were removed.
    pub fn cleanup_old_errors(&self, service: &str, keep: usize) -> Result<usize> {
        let entries = self.scan_values::<ErrorHash>(&keys::errors_by_time(service), ScanOptions::reverse())?;

        let mut kept = HashSet::new();
        let mut evicted = HashSet::new();
        let mut stale_entries = Vec::new();
        for (key, hash) in entries {
            if kept.contains(&hash) {
                continue;
            }
            if kept.len() < keep && !evicted.contains(&hash) {
                kept.insert(hash);
                continue;
            }
            stale_entries.push(key);
            evicted.insert(hash);
        }

        if evicted.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        for hash in &evicted {
            if self.delete_key(&keys::error(service, hash))? {
                deleted += 1;
            }
        }
        for key in &stale_entries {
            self.delete_key(key)?;
        }

        info!(service, deleted, pruned_index = stale_entries.len(), "evicted old errors");
        Ok(deleted)
    }
}
