use beacon_core::error::Result;
use beacon_core::model::service::ServiceInfo;
use beacon_core::query::{DashboardData, ServiceDashboard};
use beacon_core::time::{date_bucket, now_ms};
use chrono::{Days, NaiveDate};

use crate::Store;

impl Store {
    pub fn get_dashboard_data(&self, days_back: u64) -> Result<DashboardData> {
        self.get_dashboard_data_at(days_back, date_bucket(now_ms()))
    }

    /// Counter series over `[today - days_back, today]` and the latest
    /// distinct errors for every known service. Read only.
    pub fn get_dashboard_data_at(&self, days_back: u64, today: NaiveDate) -> Result<DashboardData> {
        let services = self.list_services()?;
        let mut data = DashboardData::default();
        for info in &services {
            let dashboard = self.assemble_service_dashboard(info.clone(), days_back, today)?;
            data.dashboards.insert(info.name.clone(), dashboard);
        }
        data.services = services;
        Ok(data)
    }

    pub fn get_service_dashboard(
        &self,
        name: &str,
        days_back: u64,
    ) -> Result<Option<ServiceDashboard>> {
        self.get_service_dashboard_at(name, days_back, date_bucket(now_ms()))
    }

    pub fn get_service_dashboard_at(
        &self,
        name: &str,
        days_back: u64,
        today: NaiveDate,
    ) -> Result<Option<ServiceDashboard>> {
        let Some(info) = self.get_service(name)? else {
            return Ok(None);
        };
        self.assemble_service_dashboard(info, days_back, today).map(Some)
    }

    fn assemble_service_dashboard(
        &self,
        info: ServiceInfo,
        days_back: u64,
        today: NaiveDate,
    ) -> Result<ServiceDashboard> {
        let start = today
            .checked_sub_days(Days::new(days_back))
            .unwrap_or(NaiveDate::MIN);
        let series = self.get_totals_by_date_range(
            &info.name,
            &self.options().dashboard_counter,
            start,
            today,
        )?;
        let recent_errors =
            self.get_recent_errors(&info.name, self.options().dashboard_error_limit)?;

        Ok(ServiceDashboard {
            service: info,
            series,
            recent_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::time::parse_date;
    use testkit::{base_ms, exception, sample_span};

    use crate::Store;

    #[test]
    fn empty_service_has_empty_panels() {
        let store = Store::memory();
        store.register_service("quiet").unwrap();

        let data = store
            .get_dashboard_data_at(30, parse_date("2024-01-10").unwrap())
            .unwrap();
        let quiet = &data.dashboards["quiet"];
        assert!(quiet.series.is_empty());
        assert!(quiet.recent_errors.is_empty());
        assert_eq!(data.services.len(), 1);
    }

    #[test]
    fn assembles_counters_and_errors_per_service() {
        let store = Store::open_in_memory().unwrap();
        store
            .increment_counter("web", "page_views", "/", base_ms(), 2)
            .unwrap();
        store
            .increment_counter("web", "page_views", "/old", base_ms() - 40 * 86_400_000, 9)
            .unwrap();
        store
            .increment_counter("web", "clicks", "/", base_ms(), 5)
            .unwrap();
        store
            .store_error("api", &sample_span("s1", base_ms()), &exception("E", "m", &[]))
            .unwrap();

        let today = parse_date("2024-01-05").unwrap();
        let data = store.get_dashboard_data_at(30, today).unwrap();
        assert_eq!(data.dashboards.len(), 2);

        let web = &data.dashboards["web"];
        assert_eq!(web.series.len(), 1);
        assert_eq!(web.series[0].count, 2);
        assert!(web.recent_errors.is_empty());

        let api = &data.dashboards["api"];
        assert!(api.series.is_empty());
        assert_eq!(api.recent_errors.len(), 1);

        let single = store.get_service_dashboard_at("api", 30, today).unwrap().unwrap();
        assert_eq!(&single, api);
        assert!(store.get_service_dashboard_at("nope", 30, today).unwrap().is_none());
    }
}
