use std::collections::BTreeMap;

use beacon_core::model::analytics::{DailyStats, RawEvent};
use beacon_core::model::counter::DateCount;
use beacon_core::model::exception::ErrorRecord;
use beacon_core::model::service::ServiceInfo;
use beacon_core::model::span::SpanRecord;
use beacon_core::query::{DashboardData, RollupReport, ServiceDashboard, StatusResponse};
use beacon_core::time::format_date;
use beacon_ingest::pipeline::WriteStats;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub fn print_services_human(v: &[ServiceInfo]) {
    for s in v {
        println!(
            "{} first_seen={} last_seen={}",
            s.name,
            fmt_ms(s.first_seen),
            fmt_ms(s.last_seen)
        );
    }
    println!("-- {} services --", v.len());
}

pub fn print_dashboard_human(v: &DashboardData) {
    for info in &v.services {
        if let Some(dashboard) = v.dashboards.get(&info.name) {
            print_service_dashboard_human(dashboard);
        }
    }
    println!("-- {} services --", v.services.len());
}

pub fn print_service_dashboard_human(v: &ServiceDashboard) {
    let total: u64 = v.series.iter().map(|p| p.count).sum();
    println!(
        "SERVICE {} last_seen={} total={} errors={}",
        v.service.name,
        fmt_ms(v.service.last_seen),
        total,
        v.recent_errors.len()
    );
    for point in &v.series {
        println!("  {} {}", format_date(point.date), point.count);
    }
    for err in &v.recent_errors {
        println!("  ! {}", error_line(err));
    }
}

pub fn print_errors_human(v: &[ErrorRecord]) {
    for err in v {
        println!("{}", error_line(err));
    }
    println!("-- {} errors --", v.len());
}

pub fn print_error_human(v: &ErrorRecord) {
    println!("ERROR {} service={}", v.error_hash, v.service);
    println!("{}: {}", v.error_type, v.message);
    println!(
        "count={} first_seen={} last_seen={}",
        v.count,
        fmt_ms(v.first_seen),
        fmt_ms(v.last_seen)
    );
    for frame in &v.stacktrace {
        println!("    {frame}");
    }
    println!("spans={}", v.spans.join(","));
}

pub fn print_spans_human(v: &[SpanRecord]) {
    for record in v {
        let status = match record.data.status.as_ref().map(|s| s.code) {
            Some(2) => "ERROR",
            _ => "OK",
        };
        println!(
            "{} {} trace={} span={} ({}ms) {} {}",
            fmt_ms(record.timestamp_ms),
            record.service,
            record.trace_id,
            record.span_id,
            record.data.duration_ms(),
            status,
            record.data.name
        );
    }
    println!("-- {} spans --", v.len());
}

pub fn print_totals_human(v: &[DateCount]) {
    for point in v {
        println!("{} {}", format_date(point.date), point.count);
    }
    let total: u64 = v.iter().map(|p| p.count).sum();
    println!("-- {} days, total {} --", v.len(), total);
}

pub fn print_breakdown_human(v: &BTreeMap<NaiveDate, BTreeMap<String, u64>>) {
    for (date, dims) in v {
        for (dimension, count) in dims {
            println!("{} {} {}", format_date(*date), dimension, count);
        }
    }
}

pub fn print_daily_stats_human(v: &[DailyStats]) {
    for s in v {
        println!(
            "{} {} page_views={} sessions={} errors={} requests={} avg_duration={:.1}ms",
            format_date(s.date),
            s.domain,
            s.page_views,
            s.unique_sessions,
            s.errors,
            s.server_requests,
            s.avg_duration_ms
        );
    }
    println!("-- {} days --", v.len());
}

pub fn print_events_human(v: &[RawEvent]) {
    for event in v {
        let detail = match event {
            RawEvent::Browser(e) => format!(
                "url={} session={}",
                e.url,
                e.session_id.as_deref().unwrap_or("-")
            ),
            RawEvent::Server(e) => format!(
                "{} {} status={} ({:.1}ms)",
                e.method, e.endpoint, e.status_code, e.duration_ms
            ),
            RawEvent::Error(e) => e.message.clone(),
        };
        println!("{} {} | {}", fmt_ms(event.timestamp()), event.kind(), detail);
    }
    println!("-- {} events --", v.len());
}

pub fn print_rollup_human(v: &[RollupReport]) {
    for report in v {
        let failed = report
            .failed_dates
            .iter()
            .map(|d| format_date(*d))
            .collect::<Vec<_>>();
        println!(
            "{} cutoff={} days={} deleted={} failed=[{}]",
            report.domain,
            fmt_ms(report.cutoff_ms),
            report.dates_rolled.len(),
            report.events_deleted,
            failed.join(",")
        );
        if let Some(err) = &report.error {
            println!("  ! {err}");
        }
    }
}

pub fn print_ingest_human(v: &WriteStats) {
    println!(
        "spans={} errors={} counters={} failed={}",
        v.spans, v.errors, v.counters, v.failed
    );
}

pub fn print_status_human(v: &StatusResponse) {
    println!("db_path={}", v.db_path);
    println!("db_size_bytes={}", v.db_size_bytes);
    println!("services={}", v.services_count);
    if let Some(newest) = v.newest_activity_ms {
        println!("newest={}", fmt_ms(newest));
    }
}

fn error_line(err: &ErrorRecord) -> String {
    let hash = err.error_hash.as_str();
    format!(
        "{} {}: {} count={} last_seen={}",
        hash.get(..12).unwrap_or(hash),
        err.error_type,
        err.message,
        err.count,
        fmt_ms(err.last_seen)
    )
}

fn fmt_ms(ts_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ts_ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_millis() {
        assert_eq!(fmt_ms(1_704_067_200_123), "2024-01-01T00:00:00.123Z");
        assert_eq!(fmt_ms(i64::MAX), i64::MAX.to_string());
    }
}
