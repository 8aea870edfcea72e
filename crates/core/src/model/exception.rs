use serde::{Deserialize, Serialize};

use crate::ids::ErrorHash;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExceptionEvent {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub stacktrace: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorRecord {
    pub error_hash: ErrorHash,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub stacktrace: Vec<String>,
    pub service: String,
    pub count: u64,
    pub first_seen: i64,
    pub last_seen: i64,
    /// Most recent span ids, oldest first.
    pub spans: Vec<String>,
}

impl ErrorRecord {
    pub fn first_occurrence(
        service: &str,
        error_hash: ErrorHash,
        exception: &ExceptionEvent,
        span_id: &str,
        ts_ms: i64,
    ) -> Self {
        Self {
            error_hash,
            error_type: exception.error_type.clone(),
            message: exception.message.clone(),
            stacktrace: exception.stacktrace.clone(),
            service: service.to_string(),
            count: 1,
            first_seen: ts_ms,
            last_seen: ts_ms,
            spans: vec![span_id.to_string()],
        }
    }

    pub fn record_occurrence(&mut self, span_id: &str, ts_ms: i64, span_capacity: usize) {
        self.count += 1;
        self.last_seen = ts_ms;
        self.spans.push(span_id.to_string());
        if self.spans.len() > span_capacity {
            let excess = self.spans.len() - span_capacity;
            self.spans.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_keeps_latest_spans() {
        let exception = ExceptionEvent {
            error_type: "Error".into(),
            message: "boom".into(),
            stacktrace: vec![],
        };
        let mut record = ErrorRecord::first_occurrence(
            "api",
            ErrorHash::of(&exception),
            &exception,
            "s0",
            10,
        );
        for i in 1..12 {
            record.record_occurrence(&format!("s{i}"), 10 + i, 10);
        }

        assert_eq!(record.count, 12);
        assert_eq!(record.first_seen, 10);
        assert_eq!(record.last_seen, 21);
        assert_eq!(record.spans.len(), 10);
        assert_eq!(record.spans.first().map(String::as_str), Some("s2"));
        assert_eq!(record.spans.last().map(String::as_str), Some("s11"));
    }
}
