use beacon_core::model::span::{Span, SpanEvent, SpanStatus};
use beacon_core::time::nanos_to_millis;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value as AnyValueKind;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::metric::Data;
use opentelemetry_proto::tonic::metrics::v1::number_data_point::Value as NumberValue;
use opentelemetry_proto::tonic::metrics::v1::{Metric, NumberDataPoint};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
use serde_json::{Map, Value};
use tracing::warn;

const SERVICE_NAME: &str = "service.name";
const DIMENSION_KEYS: [&str; 3] = ["url.path", "location", "http.target"];
const DEFAULT_DIMENSION: &str = "/";

/// A span together with the service that emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpan {
    pub service: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterIncrement {
    pub service: String,
    pub counter: String,
    pub dimension: String,
    pub ts_ms: i64,
    pub delta: u64,
}

/// Every span of the request, skipping resources without a service name.
pub fn decode_traces(req: &ExportTraceServiceRequest) -> Vec<ServiceSpan> {
    let mut out = Vec::new();
    for rs in &req.resource_spans {
        let Some(service) = service_name(rs.resource.as_ref()) else {
            warn!(spans = rs.scope_spans.len(), "resource without service.name skipped");
            continue;
        };
        for ss in &rs.scope_spans {
            for span in &ss.spans {
                out.push(ServiceSpan {
                    service: service.clone(),
                    span: decode_span(span),
                });
            }
        }
    }
    out
}

/// Counter increments for every Sum data point. Other metric shapes are ignored.
pub fn decode_metrics(req: &ExportMetricsServiceRequest) -> Vec<CounterIncrement> {
    let mut out = Vec::new();
    for rm in &req.resource_metrics {
        let Some(service) = service_name(rm.resource.as_ref()) else {
            continue;
        };
        for sm in &rm.scope_metrics {
            for metric in &sm.metrics {
                let Some(Data::Sum(sum)) = &metric.data else {
                    continue;
                };
                out.extend(
                    sum.data_points
                        .iter()
                        .filter_map(|point| decode_counter_point(&service, metric, point)),
                );
            }
        }
    }
    out
}

pub fn decode_span(span: &OtlpSpan) -> Span {
    Span {
        trace_id: bytes_to_hex(&span.trace_id).unwrap_or_default(),
        span_id: bytes_to_hex(&span.span_id).unwrap_or_default(),
        parent_span_id: bytes_to_hex(&span.parent_span_id),
        name: span.name.clone(),
        kind: span.kind,
        start_time_unix_nano: span.start_time_unix_nano,
        end_time_unix_nano: span.end_time_unix_nano,
        attributes: kv_to_json(&span.attributes),
        events: span
            .events
            .iter()
            .map(|e| SpanEvent {
                name: e.name.clone(),
                time_unix_nano: e.time_unix_nano,
                attributes: kv_to_json(&e.attributes),
            })
            .collect(),
        status: span.status.as_ref().map(|s| SpanStatus {
            code: s.code,
            message: s.message.clone(),
        }),
    }
}

pub fn decode_counter_point(
    service: &str,
    metric: &Metric,
    point: &NumberDataPoint,
) -> Option<CounterIncrement> {
    let delta = match point.value {
        Some(NumberValue::AsInt(v)) => v,
        Some(NumberValue::AsDouble(v)) => v.round() as i64,
        None => 1,
    };
    let Ok(delta) = u64::try_from(delta) else {
        warn!(service, counter = %metric.name, delta, "negative counter delta dropped");
        return None;
    };

    let dimension = point
        .attributes
        .iter()
        .find(|kv| DIMENSION_KEYS.contains(&kv.key.as_str()))
        .map(|kv| any_value_to_string(kv.value.as_ref()))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DIMENSION.to_string());

    Some(CounterIncrement {
        service: service.to_string(),
        counter: metric.name.clone(),
        dimension,
        ts_ms: nanos_to_millis(point.time_unix_nano),
        delta,
    })
}

fn service_name(resource: Option<&Resource>) -> Option<String> {
    resource?
        .attributes
        .iter()
        .find(|kv| kv.key == SERVICE_NAME)
        .map(|kv| any_value_to_string(kv.value.as_ref()))
        .filter(|name| !name.is_empty())
}

fn kv_to_json(attrs: &[KeyValue]) -> Map<String, Value> {
    attrs
        .iter()
        .map(|kv| (kv.key.clone(), any_value_to_json(kv.value.as_ref())))
        .collect()
}

fn any_value_to_json(value: Option<&AnyValue>) -> Value {
    let Some(kind) = value.and_then(|v| v.value.as_ref()) else {
        return Value::Null;
    };
    match kind {
        AnyValueKind::StringValue(s) => Value::String(s.clone()),
        AnyValueKind::BoolValue(b) => Value::Bool(*b),
        AnyValueKind::IntValue(i) => Value::from(*i),
        AnyValueKind::DoubleValue(d) => Value::from(*d),
        AnyValueKind::BytesValue(b) => Value::String(bytes_to_hex(b).unwrap_or_default()),
        AnyValueKind::ArrayValue(arr) => Value::Array(
            arr.values
                .iter()
                .map(|v| any_value_to_json(Some(v)))
                .collect(),
        ),
        AnyValueKind::KvlistValue(list) => Value::Object(kv_to_json(&list.values)),
    }
}

fn any_value_to_string(value: Option<&AnyValue>) -> String {
    match any_value_to_json(value) {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn bytes_to_hex(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    Some(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use opentelemetry_proto::tonic::common::v1::{AnyValue, ArrayValue, KeyValue};
    use opentelemetry_proto::tonic::metrics::v1::{
        Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum, metric,
        number_data_point,
    };
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span as OtlpSpan, span};

    use super::*;

    fn string_kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.into(),
            value: Some(AnyValue {
                value: Some(AnyValueKind::StringValue(value.into())),
            }),
        }
    }

    fn resource(service: Option<&str>) -> Option<Resource> {
        Some(Resource {
            attributes: service.map(|s| vec![string_kv("service.name", s)]).unwrap_or_default(),
            dropped_attributes_count: 0,
            entity_refs: vec![],
        })
    }

    fn sum_point(value: Option<number_data_point::Value>, attrs: Vec<KeyValue>) -> NumberDataPoint {
        NumberDataPoint {
            attributes: attrs,
            time_unix_nano: 1_704_067_200_000_000_000,
            value,
            ..Default::default()
        }
    }

    fn metrics_request(metrics: Vec<Metric>) -> ExportMetricsServiceRequest {
        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: resource(Some("web")),
                scope_metrics: vec![ScopeMetrics {
                    metrics,
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn decodes_span_with_exception_event() {
        let otlp = OtlpSpan {
            trace_id: vec![1; 16],
            span_id: vec![0xab; 8],
            name: "GET /".into(),
            start_time_unix_nano: 1_704_067_200_500_000_000,
            end_time_unix_nano: 1_704_067_200_600_000_000,
            attributes: vec![KeyValue {
                key: "http.status_code".into(),
                value: Some(AnyValue {
                    value: Some(AnyValueKind::IntValue(500)),
                }),
            }],
            events: vec![span::Event {
                name: "exception".into(),
                time_unix_nano: 1_704_067_200_550_000_000,
                attributes: vec![
                    string_kv("exception.type", "TypeError"),
                    string_kv("exception.message", "x is undefined"),
                    KeyValue {
                        key: "exception.stacktrace".into(),
                        value: Some(AnyValue {
                            value: Some(AnyValueKind::ArrayValue(ArrayValue {
                                values: vec![
                                    AnyValue {
                                        value: Some(AnyValueKind::StringValue("at a".into())),
                                    },
                                    AnyValue {
                                        value: Some(AnyValueKind::StringValue("at b".into())),
                                    },
                                ],
                            })),
                        }),
                    },
                ],
                dropped_attributes_count: 0,
            }],
            ..Default::default()
        };
        let req = ExportTraceServiceRequest {
            resource_spans: vec![
                ResourceSpans {
                    resource: resource(Some("api")),
                    scope_spans: vec![ScopeSpans {
                        spans: vec![otlp.clone()],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ResourceSpans {
                    resource: resource(None),
                    scope_spans: vec![ScopeSpans {
                        spans: vec![otlp],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
        };

        let decoded = decode_traces(&req);
        assert_eq!(decoded.len(), 1);
        let ServiceSpan { service, span } = &decoded[0];
        assert_eq!(service, "api");
        assert_eq!(span.span_id, "abababababababab");
        assert_eq!(span.parent_span_id, None);
        assert_eq!(span.start_ms(), 1_704_067_200_500);
        assert_eq!(span.attributes["http.status_code"], Value::from(500));

        let exceptions = span.exceptions();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].error_type, "TypeError");
        assert_eq!(exceptions[0].stacktrace, vec!["at a", "at b"]);
    }

    #[test]
    fn ids_are_lowercase_hex_and_empty_ids_are_absent() {
        let span = decode_span(&OtlpSpan {
            trace_id: vec![0x0a, 0xff, 0x00, 0x10],
            span_id: vec![0xde, 0xad, 0xbe, 0xef],
            ..Default::default()
        });
        assert_eq!(span.trace_id, "0aff0010");
        assert_eq!(span.span_id, "deadbeef");
        assert_eq!(span.parent_span_id, None);
    }

    #[test]
    fn sum_points_become_counter_increments() {
        let req = metrics_request(vec![
            Metric {
                name: "page_views".into(),
                data: Some(metric::Data::Sum(Sum {
                    data_points: vec![
                        sum_point(
                            Some(number_data_point::Value::AsInt(3)),
                            vec![string_kv("browser", "firefox"), string_kv("url.path", "/home")],
                        ),
                        sum_point(Some(number_data_point::Value::AsDouble(1.6)), vec![]),
                        sum_point(None, vec![string_kv("http.target", "/api")]),
                        sum_point(Some(number_data_point::Value::AsInt(-2)), vec![]),
                    ],
                    ..Default::default()
                })),
                ..Default::default()
            },
            Metric {
                name: "memory".into(),
                data: Some(metric::Data::Gauge(Gauge {
                    data_points: vec![sum_point(Some(number_data_point::Value::AsInt(9)), vec![])],
                    ..Default::default()
                })),
                ..Default::default()
            },
        ]);

        let increments = decode_metrics(&req);
        let summary = increments
            .iter()
            .map(|i| (i.dimension.as_str(), i.delta))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![("/home", 3), ("/", 2), ("/api", 1)]);
        assert!(increments.iter().all(|i| i.service == "web" && i.counter == "page_views"));
        assert_eq!(increments[0].ts_ms, 1_704_067_200_000);
    }
}
