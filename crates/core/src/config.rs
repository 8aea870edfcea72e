use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub span_ttl: Duration,
    pub retention_window: Duration,
    pub rollup_interval: Duration,
    pub rollup_domains: Vec<String>,
    pub error_keep_count: usize,
    pub error_span_capacity: usize,
    pub dashboard_days: u64,
    pub dashboard_counter: String,
    pub cas_max_attempts: u32,
    pub cas_base_backoff: Duration,
    pub cas_max_backoff: Duration,
    pub write_batch_size: usize,
    pub write_flush_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home).join(".local/share"));

        Self {
            db_path: data_root.join("beacon/beacon.duckdb"),
            span_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            retention_window: Duration::from_secs(30 * 24 * 60 * 60),
            rollup_interval: Duration::from_secs(60 * 60),
            rollup_domains: Vec::new(),
            error_keep_count: 50,
            error_span_capacity: 10,
            dashboard_days: 30,
            dashboard_counter: "page_views".to_string(),
            cas_max_attempts: 64,
            cas_base_backoff: Duration::from_millis(1),
            cas_max_backoff: Duration::from_millis(50),
            write_batch_size: 256,
            write_flush_ms: 200,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    span_ttl: Option<String>,
    retention_window: Option<String>,
    rollup_interval: Option<String>,
    rollup_domains: Option<Vec<String>>,
    error_keep_count: Option<usize>,
    error_span_capacity: Option<usize>,
    dashboard_days: Option<u64>,
    dashboard_counter: Option<String>,
    cas_max_attempts: Option<u32>,
    cas_base_backoff: Option<String>,
    cas_max_backoff: Option<String>,
    write_batch_size: Option<usize>,
    write_flush_ms: Option<u64>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("BEACON_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("beacon/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| BeaconError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| BeaconError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        db_path: env::var("BEACON_DB_PATH").ok().map(PathBuf::from),
        span_ttl: env::var("BEACON_SPAN_TTL").ok(),
        retention_window: env::var("BEACON_RETENTION_WINDOW").ok(),
        rollup_interval: env::var("BEACON_ROLLUP_INTERVAL").ok(),
        rollup_domains: env::var("BEACON_ROLLUP_DOMAINS")
            .ok()
            .map(|v| parse_domain_list(&v)),
        error_keep_count: env_number("BEACON_ERROR_KEEP_COUNT")?,
        error_span_capacity: env_number("BEACON_ERROR_SPAN_CAPACITY")?,
        dashboard_days: env_number("BEACON_DASHBOARD_DAYS")?,
        dashboard_counter: env::var("BEACON_DASHBOARD_COUNTER").ok(),
        cas_max_attempts: env_number("BEACON_CAS_MAX_ATTEMPTS")?,
        cas_base_backoff: env::var("BEACON_CAS_BASE_BACKOFF").ok(),
        cas_max_backoff: env::var("BEACON_CAS_MAX_BACKOFF").ok(),
        write_batch_size: None,
        write_flush_ms: None,
    })
}

fn env_number<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| BeaconError::Config(format!("bad {name} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_duration_field(name: &str, value: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        BeaconError::Config(format!("bad {name} in {source}: {e} (value={value})"))
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.span_ttl {
        cfg.span_ttl = parse_duration_field("span_ttl", &v, source)?;
    }
    if let Some(v) = overrides.retention_window {
        cfg.retention_window = parse_duration_field("retention_window", &v, source)?;
    }
    if let Some(v) = overrides.rollup_interval {
        cfg.rollup_interval = parse_duration_field("rollup_interval", &v, source)?;
    }
    if let Some(v) = overrides.rollup_domains {
        cfg.rollup_domains = v;
    }
    if let Some(v) = overrides.error_keep_count {
        cfg.error_keep_count = v;
    }
    if let Some(v) = overrides.error_span_capacity {
        if v == 0 {
            return Err(BeaconError::Config(format!(
                "error_span_capacity in {source} must be at least 1"
            )));
        }
        cfg.error_span_capacity = v;
    }
    if let Some(v) = overrides.dashboard_days {
        cfg.dashboard_days = v;
    }
    if let Some(v) = overrides.dashboard_counter {
        cfg.dashboard_counter = v;
    }
    if let Some(v) = overrides.cas_max_attempts {
        if v == 0 {
            return Err(BeaconError::Config(format!(
                "cas_max_attempts in {source} must be at least 1"
            )));
        }
        cfg.cas_max_attempts = v;
    }
    if let Some(v) = overrides.cas_base_backoff {
        cfg.cas_base_backoff = parse_duration_field("cas_base_backoff", &v, source)?;
    }
    if let Some(v) = overrides.cas_max_backoff {
        cfg.cas_max_backoff = parse_duration_field("cas_max_backoff", &v, source)?;
    }
    if let Some(v) = overrides.write_batch_size {
        cfg.write_batch_size = v;
    }
    if let Some(v) = overrides.write_flush_ms {
        cfg.write_flush_ms = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_thirty_day_windows() {
        let cfg = Config::default();
        assert_eq!(cfg.span_ttl, Duration::from_secs(30 * 86_400));
        assert_eq!(cfg.retention_window, Duration::from_secs(30 * 86_400));
        assert_eq!(cfg.error_keep_count, 50);
        assert_eq!(cfg.error_span_capacity, 10);
        assert_eq!(cfg.dashboard_counter, "page_views");
    }

    #[test]
    fn parse_domain_list_skips_blanks() {
        assert_eq!(
            parse_domain_list("o.kbn.one, dd2030.org,,"),
            vec!["o.kbn.one".to_string(), "dd2030.org".to_string()]
        );
    }

    #[test]
    fn apply_file_overrides_updates_fields() {
        let mut cfg = Config::default();
        let file: ConfigOverrides = toml::from_str(
            r#"
            retention_window = "7d"
            rollup_domains = ["example.org"]
            cas_max_attempts = 8
            cas_max_backoff = "20ms"
            "#,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.retention_window, Duration::from_secs(7 * 86_400));
        assert_eq!(cfg.rollup_domains, vec!["example.org".to_string()]);
        assert_eq!(cfg.cas_max_attempts, 8);
        assert_eq!(cfg.cas_max_backoff, Duration::from_millis(20));
    }

    #[test]
    fn apply_overrides_rejects_bad_values() {
        let mut cfg = Config::default();
        let bad_duration = ConfigOverrides {
            span_ttl: Some("soon".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, bad_duration, "environment").is_err());

        let zero_attempts = ConfigOverrides {
            cas_max_attempts: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, zero_attempts, "environment").is_err());
    }
}
