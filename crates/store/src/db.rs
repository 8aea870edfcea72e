use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use beacon_core::config::Config;
use beacon_core::error::{BeaconError, Result};
use beacon_core::query::StatusResponse;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::key::Key;
use crate::kv::{DuckKv, KvStore, MemoryKv, ScanOptions};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    pub span_ttl: Duration,
    pub retention_window: Duration,
    pub error_keep_count: usize,
    pub error_span_capacity: usize,
    pub dashboard_counter: String,
    pub dashboard_error_limit: usize,
    pub retry: RetryPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for StoreOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            span_ttl: cfg.span_ttl,
            retention_window: cfg.retention_window,
            error_keep_count: cfg.error_keep_count,
            error_span_capacity: cfg.error_span_capacity,
            dashboard_counter: cfg.dashboard_counter.clone(),
            dashboard_error_limit: 10,
            retry: RetryPolicy {
                max_attempts: cfg.cas_max_attempts,
                base_backoff: cfg.cas_base_backoff,
                max_backoff: cfg.cas_max_backoff,
            },
        }
    }
}

/// A decoded value together with the version token it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Handle to the telemetry store. Cheap to clone; all clones share one backend.
#[derive(Clone)]
pub struct Store {
    kv: Arc<dyn KvStore>,
    db_path: String,
    options: StoreOptions,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let kv = DuckKv::open(path)?;
        let db_path = kv.db_path().to_string();
        Ok(Self {
            kv: Arc::new(kv),
            db_path,
            options: StoreOptions::default(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let kv = DuckKv::open_in_memory()?;
        Ok(Self::with_kv(Arc::new(kv)))
    }

    /// Process-local store without DuckDB, mostly for tests and embedding.
    pub fn memory() -> Self {
        Self::with_kv(Arc::new(MemoryKv::new()))
    }

    pub fn with_kv(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            db_path: ":memory:".to_string(),
            options: StoreOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let services = self.list_services()?;
        let db_size_bytes = if self.db_path == ":memory:" {
            0
        } else {
            fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StatusResponse {
            db_path: self.db_path.clone(),
            db_size_bytes,
            services_count: services.len(),
            newest_activity_ms: services.iter().map(|s| s.last_seen).max(),
        })
    }

    /// Drops keys whose TTL has passed. Reads already hide them; this frees space.
    pub fn purge_expired(&self) -> Result<usize> {
        let purged = self.kv.purge_expired()?;
        debug!(purged, "purged expired keys");
        Ok(purged)
    }

    /// Releases the backend. Every clone of this handle fails with
    /// `NotInitialized` afterwards.
    pub fn close(&self) -> Result<()> {
        self.kv.close()
    }

    pub(crate) fn get_value<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<Versioned<T>>> {
        let Some(entry) = self.kv.get(&key.encode())? else {
            return Ok(None);
        };
        Ok(Some(Versioned {
            value: decode_value(key, &entry.value)?,
            version: entry.version,
        }))
    }

    pub(crate) fn put_value<T: Serialize>(
        &self,
        key: &Key,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.kv.set(&key.encode(), &encode_value(key, value)?, ttl)?;
        Ok(())
    }

    pub(crate) fn delete_key(&self, key: &Key) -> Result<bool> {
        self.kv.delete(&key.encode())
    }

    /// Decoded keys only, for scans whose values are not needed.
    pub(crate) fn scan_keys(&self, prefix: &Key, opts: ScanOptions) -> Result<Vec<Key>> {
        self.kv
            .scan(&prefix.encode(), opts)?
            .into_iter()
            .map(|pair| Key::decode(&pair.key))
            .collect()
    }

    pub(crate) fn scan_values<T: DeserializeOwned>(
        &self,
        prefix: &Key,
        opts: ScanOptions,
    ) -> Result<Vec<(Key, T)>> {
        self.kv
            .scan(&prefix.encode(), opts)?
            .into_iter()
            .map(|pair| {
                let key = Key::decode(&pair.key)?;
                let value = decode_value(&key, &pair.entry.value)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Optimistic read-modify-write on one key.
    ///
    /// `apply` sees the current value and returns the replacement, or `None`
    /// to leave the key untouched. A lost compare-and-swap re-reads and calls
    /// `apply` again, backing off between attempts; once the policy's attempt
    /// budget is spent the update fails with `ResourceExhausted`.
    pub(crate) fn update_with_retry<T, F>(
        &self,
        key: &Key,
        ttl: Option<Duration>,
        mut apply: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<&T>) -> Option<T>,
    {
        let encoded_key = key.encode();
        let policy = self.options.retry;

        for attempt in 1..=policy.max_attempts {
            let current = self.get_value::<T>(key)?;
            let expected = current.as_ref().map(|c| c.version);
            let Some(next) = apply(current.as_ref().map(|c| &c.value)) else {
                return Ok(None);
            };

            let bytes = encode_value(key, &next)?;
            if self.kv.compare_and_swap(&encoded_key, expected, &bytes, ttl)? {
                return Ok(Some(next));
            }

            debug!(key = %key, attempt, "compare-and-swap conflict");
            if attempt < policy.max_attempts {
                thread::sleep(policy.backoff(attempt));
            }
        }

        warn!(key = %key, attempts = policy.max_attempts, "compare-and-swap retries exhausted");
        Err(BeaconError::ResourceExhausted(format!(
            "{key} still conflicting after {} attempts",
            policy.max_attempts
        )))
    }
}

fn encode_value<T: Serialize>(key: &Key, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| BeaconError::Internal(format!("failed to encode value for {key}: {e}")))
}

fn decode_value<T: DeserializeOwned>(key: &Key, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| BeaconError::CorruptValue(format!("{key}: {e}")))
}
