use beacon_core::error::Result;
use beacon_core::model::span::{Span, SpanRecord};
use tracing::debug;

use crate::Store;
use crate::keys;
use crate::kv::ScanOptions;

impl Store {
    /// Writes the span under its start millisecond with the configured TTL.
    /// Rewriting the same span replaces it.
    pub fn store_span(&self, service: &str, span: &Span) -> Result<SpanRecord> {
        self.register_service(service)?;

        let record = SpanRecord {
            span_id: span.span_id.clone(),
            trace_id: span.trace_id.clone(),
            service: service.to_string(),
            timestamp_ms: span.start_ms(),
            data: span.clone(),
        };
        let key = keys::span(service, record.timestamp_ms, &record.span_id);
        self.put_value(&key, &record, Some(self.options().span_ttl))?;

        debug!(service, span_id = %record.span_id, ts = record.timestamp_ms, "span stored");
        Ok(record)
    }

    pub fn get_span(&self, service: &str, ts_ms: i64, span_id: &str) -> Result<Option<SpanRecord>> {
        Ok(self
            .get_value::<SpanRecord>(&keys::span(service, ts_ms, span_id))?
            .map(|v| v.value))
    }

    /// Newest spans first.
    pub fn get_recent_spans(&self, service: &str, limit: usize) -> Result<Vec<SpanRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .scan_values::<SpanRecord>(&keys::spans(service), ScanOptions::reverse().limit(limit))?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}
