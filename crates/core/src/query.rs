use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::counter::DateCount;
use crate::model::exception::ErrorRecord;
use crate::model::service::ServiceInfo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDashboard {
    pub service: ServiceInfo,
    pub series: Vec<DateCount>,
    pub recent_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DashboardData {
    /// Ordered by last activity, newest first.
    pub services: Vec<ServiceInfo>,
    pub dashboards: BTreeMap<String, ServiceDashboard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RollupReport {
    pub domain: String,
    pub cutoff_ms: i64,
    pub dates_rolled: Vec<NaiveDate>,
    pub failed_dates: Vec<NaiveDate>,
    pub events_deleted: usize,
    /// Set when the pass aborted before any date was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RollupReport {
    pub fn failed(domain: &str, error: impl ToString) -> Self {
        Self {
            domain: domain.to_string(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed_dates.is_empty() && self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub services_count: usize,
    pub newest_activity_ms: Option<i64>,
}
