use beacon_core::model::analytics::{BrowserEvent, ErrorEvent, ErrorOrigin, ServerEvent};
use beacon_core::model::exception::ExceptionEvent;
use beacon_core::model::span::{EXCEPTION_EVENT, Span, SpanEvent, SpanStatus};
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

pub const DOMAIN: &str = "example.org";

/// 2024-01-01T00:00:00Z in epoch milliseconds.
pub fn base_ms() -> i64 {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .unwrap()
        .timestamp_millis()
}

pub fn random_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn random_span_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

pub fn sample_span(span_id: &str, start_ms: i64) -> Span {
    let start = start_ms as u64 * 1_000_000;
    Span {
        trace_id: random_trace_id(),
        span_id: span_id.to_string(),
        parent_span_id: None,
        name: "GET /v1/orders".to_string(),
        kind: 2,
        start_time_unix_nano: start,
        end_time_unix_nano: start + 42_000_000,
        attributes: object(json!({ "http.method": "GET", "http.status_code": 200 })),
        events: Vec::new(),
        status: Some(SpanStatus {
            code: 1,
            message: String::new(),
        }),
    }
}

pub fn exception(error_type: &str, message: &str, frames: &[&str]) -> ExceptionEvent {
    ExceptionEvent {
        error_type: error_type.to_string(),
        message: message.to_string(),
        stacktrace: frames.iter().map(|f| f.to_string()).collect(),
    }
}

/// A span carrying `exception` as an OTel exception event.
pub fn span_with_exception(span_id: &str, start_ms: i64, exception: &ExceptionEvent) -> Span {
    let mut span = sample_span(span_id, start_ms);
    span.status = Some(SpanStatus {
        code: 2,
        message: exception.message.clone(),
    });
    span.events.push(SpanEvent {
        name: EXCEPTION_EVENT.to_string(),
        time_unix_nano: span.start_time_unix_nano,
        attributes: object(json!({
            "exception.type": exception.error_type,
            "exception.message": exception.message,
            "exception.stacktrace": exception.stacktrace,
        })),
    });
    span
}

pub fn browser_event(timestamp: i64, url: &str, session_id: Option<&str>) -> BrowserEvent {
    BrowserEvent {
        domain: DOMAIN.to_string(),
        timestamp,
        url: url.to_string(),
        referrer: None,
        user_agent: Some("Mozilla/5.0".to_string()),
        screen_resolution: Some("1920x1080".to_string()),
        language: Some("en-US".to_string()),
        session_id: session_id.map(str::to_string),
    }
}

pub fn server_event(timestamp: i64, endpoint: &str, duration_ms: f64) -> ServerEvent {
    ServerEvent {
        domain: DOMAIN.to_string(),
        timestamp,
        endpoint: endpoint.to_string(),
        method: "GET".to_string(),
        status_code: 200,
        duration_ms,
        user_agent: None,
        ip: Some("203.0.113.7".to_string()),
    }
}

pub fn error_event(timestamp: i64, message: &str) -> ErrorEvent {
    ErrorEvent {
        domain: DOMAIN.to_string(),
        timestamp,
        message: message.to_string(),
        stack: Some("at handler (app.js:1:1)".to_string()),
        url: Some("/checkout".to_string()),
        user_agent: None,
        origin: ErrorOrigin::Browser,
    }
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
