use beacon_core::error::{BeaconError, Result};
use beacon_core::model::service::ServiceInfo;
use beacon_core::time::now_ms;
use tracing::debug;

use crate::Store;
use crate::keys;

impl Store {
    pub fn register_service(&self, name: &str) -> Result<()> {
        self.register_service_at(name, now_ms())
    }

    /// Bumps `last_seen` (keeping the first `first_seen`) and makes sure the
    /// name is in the services index. The index only changes for new names.
    pub fn register_service_at(&self, name: &str, now: i64) -> Result<()> {
        if name.is_empty() {
            return Err(BeaconError::InvalidArgument("empty service name".into()));
        }
        let info_key = keys::service_info(name);
        let first_seen = self
            .get_value::<ServiceInfo>(&info_key)?
            .map(|v| v.value.first_seen)
            .unwrap_or(now);
        self.put_value(
            &info_key,
            &ServiceInfo {
                name: name.to_string(),
                first_seen,
                last_seen: now,
            },
            None,
        )?;

        let added = self.update_with_retry::<Vec<String>, _>(&keys::services(), None, |names| {
            let names = names.cloned().unwrap_or_default();
            match names.binary_search_by(|n| n.as_str().cmp(name)) {
                Ok(_) => None,
                Err(pos) => {
                    let mut names = names;
                    names.insert(pos, name.to_string());
                    Some(names)
                }
            }
        })?;
        if added.is_some() {
            debug!(service = name, "registered new service");
        }
        Ok(())
    }

    /// Known services, most recently active first.
    pub fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let names = self
            .get_value::<Vec<String>>(&keys::services())?
            .map(|v| v.value)
            .unwrap_or_default();

        let mut services = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(info) = self.get_service(name)? {
                services.push(info);
            }
        }
        services.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.name.cmp(&b.name)));
        Ok(services)
    }

    pub fn get_service(&self, name: &str) -> Result<Option<ServiceInfo>> {
        Ok(self
            .get_value::<ServiceInfo>(&keys::service_info(name))?
            .map(|v| v.value))
    }
}
