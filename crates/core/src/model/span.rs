use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::exception::ExceptionEvent;
use crate::time::nanos_to_millis;

pub const EXCEPTION_EVENT: &str = "exception";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: i32,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_nano: u64,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SpanStatus {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl Span {
    pub fn start_ms(&self) -> i64 {
        nanos_to_millis(self.start_time_unix_nano)
    }

    pub fn duration_ms(&self) -> i64 {
        nanos_to_millis(self.end_time_unix_nano.saturating_sub(self.start_time_unix_nano))
    }

    /// Exception events carrying both a type and a message.
    pub fn exceptions(&self) -> Vec<ExceptionEvent> {
        self.events
            .iter()
            .filter(|e| e.name == EXCEPTION_EVENT)
            .filter_map(|e| {
                let error_type = string_attr(&e.attributes, "exception.type");
                let message = string_attr(&e.attributes, "exception.message");
                if error_type.is_empty() || message.is_empty() {
                    return None;
                }
                Some(ExceptionEvent {
                    error_type,
                    message,
                    stacktrace: stacktrace_attr(&e.attributes),
                })
            })
            .collect()
    }
}

fn string_attr(attrs: &Map<String, Value>, key: &str) -> String {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn stacktrace_attr(attrs: &Map<String, Value>) -> Vec<String> {
    match attrs.get("exception.stacktrace") {
        Some(Value::Array(frames)) => frames
            .iter()
            .map(|f| f.as_str().unwrap_or_default().to_string())
            .collect(),
        Some(Value::String(raw)) => raw.lines().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpanRecord {
    pub span_id: String,
    pub trace_id: String,
    pub service: String,
    pub timestamp_ms: i64,
    pub data: Span,
}
