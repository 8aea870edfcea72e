use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RawEventKind {
    Browser,
    Server,
    Error,
}

impl RawEventKind {
    pub const ALL: [RawEventKind; 3] = [Self::Browser, Self::Server, Self::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Server => "server",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RawEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RawEventKind {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "browser" => Ok(Self::Browser),
            "server" => Ok(Self::Server),
            "error" => Ok(Self::Error),
            _ => Err(BeaconError::Parse(format!("unknown event kind: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BrowserEvent {
    pub domain: String,
    pub timestamp: i64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerEvent {
    pub domain: String,
    pub timestamp: i64,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    #[default]
    Browser,
    Server,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ErrorEvent {
    pub domain: String,
    pub timestamp: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub origin: ErrorOrigin,
}

/// One raw event as returned by reads, tagged with its kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawEvent {
    Browser(BrowserEvent),
    Server(ServerEvent),
    Error(ErrorEvent),
}

impl RawEvent {
    pub fn kind(&self) -> RawEventKind {
        match self {
            Self::Browser(_) => RawEventKind::Browser,
            Self::Server(_) => RawEventKind::Server,
            Self::Error(_) => RawEventKind::Error,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Browser(e) => e.timestamp,
            Self::Server(e) => e.timestamp,
            Self::Error(e) => e.timestamp,
        }
    }
}

/// Per-domain, per-day aggregate produced by the rollup job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyStats {
    pub domain: String,
    pub date: NaiveDate,
    pub page_views: u64,
    pub unique_sessions: u64,
    pub errors: u64,
    pub server_requests: u64,
    pub avg_duration_ms: f64,
}

impl DailyStats {
    pub fn empty(domain: &str, date: NaiveDate) -> Self {
        Self {
            domain: domain.to_string(),
            date,
            page_views: 0,
            unique_sessions: 0,
            errors: 0,
            server_requests: 0,
            avg_duration_ms: 0.0,
        }
    }

    /// Folds one server request into the running average.
    pub fn record_server_request(&mut self, duration_ms: f64) {
        let old = self.server_requests as f64;
        self.server_requests += 1;
        self.avg_duration_ms = (self.avg_duration_ms * old + duration_ms) / self.server_requests as f64;
    }

    /// Merges a freshly computed partial into a stored row.
    ///
    /// Page views, errors and request counts add up. The duration average is
    /// re-weighted by request count. Unique sessions are replaced: the partial
    /// was recounted from the session markers, which are never deleted.
    pub fn merge(&mut self, partial: &DailyStats) {
        self.page_views += partial.page_views;
        self.errors += partial.errors;

        let total = self.server_requests + partial.server_requests;
        self.avg_duration_ms = if total > 0 {
            (self.avg_duration_ms * self.server_requests as f64
                + partial.avg_duration_ms * partial.server_requests as f64)
                / total as f64
        } else {
            0.0
        };
        self.server_requests = total;

        self.unique_sessions = partial.unique_sessions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn running_average_matches_mean() {
        let mut stats = DailyStats::empty("example.org", date());
        for d in [10.0, 20.0, 60.0] {
            stats.record_server_request(d);
        }
        assert_eq!(stats.server_requests, 3);
        assert!((stats.avg_duration_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn merge_adds_counts_and_replaces_sessions() {
        let mut stored = DailyStats {
            page_views: 5,
            unique_sessions: 3,
            errors: 1,
            server_requests: 2,
            avg_duration_ms: 10.0,
            ..DailyStats::empty("example.org", date())
        };
        let partial = DailyStats {
            page_views: 2,
            unique_sessions: 4,
            errors: 1,
            server_requests: 2,
            avg_duration_ms: 30.0,
            ..DailyStats::empty("example.org", date())
        };

        stored.merge(&partial);

        assert_eq!(stored.page_views, 7);
        assert_eq!(stored.errors, 2);
        assert_eq!(stored.unique_sessions, 4);
        assert_eq!(stored.server_requests, 4);
        assert!((stored.avg_duration_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn merge_of_empty_rows_keeps_zero_average() {
        let mut stored = DailyStats::empty("example.org", date());
        stored.merge(&DailyStats::empty("example.org", date()));
        assert_eq!(stored.avg_duration_ms, 0.0);
    }

    #[test]
    fn parses_event_kinds() {
        assert_eq!("Server".parse::<RawEventKind>().unwrap(), RawEventKind::Server);
        assert!("metric".parse::<RawEventKind>().is_err());
    }
}
