//! KV wrappers that inject failures into an otherwise healthy backend.

use std::time::Duration;

use beacon_core::error::{BeaconError, Result};

use crate::kv::{Entry, KvPair, KvStore, MemoryKv, ScanOptions};

/// Every compare-and-swap loses.
#[derive(Default)]
pub struct ConflictingKv {
    pub inner: MemoryKv,
}

impl KvStore for ConflictingKv {
    fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        self.inner.get(key)
    }

    fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<u64> {
        self.inner.set(key, value, ttl)
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        self.inner.delete(key)
    }

    fn scan(&self, prefix: &[u8], opts: ScanOptions) -> Result<Vec<KvPair>> {
        self.inner.scan(prefix, opts)
    }

    fn compare_and_swap(
        &self,
        _key: &[u8],
        _expected: Option<u64>,
        _value: &[u8],
        _ttl: Option<Duration>,
    ) -> Result<bool> {
        Ok(false)
    }

    fn purge_expired(&self) -> Result<usize> {
        self.inner.purge_expired()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Set,
    Delete,
}

/// Unconditional writes or deletes of one exact key fail.
pub struct FailingKeyKv {
    pub inner: MemoryKv,
    pub poisoned_key: Vec<u8>,
    pub fail_on: FailOn,
}

impl FailingKeyKv {
    fn poisoned(&self, key: &[u8], op: FailOn) -> bool {
        self.fail_on == op && key == self.poisoned_key.as_slice()
    }
}

impl KvStore for FailingKeyKv {
    fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        self.inner.get(key)
    }

    fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<u64> {
        if self.poisoned(key, FailOn::Set) {
            return Err(BeaconError::Store("injected write failure".to_string()));
        }
        self.inner.set(key, value, ttl)
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        if self.poisoned(key, FailOn::Delete) {
            return Err(BeaconError::Store("injected delete failure".to_string()));
        }
        self.inner.delete(key)
    }

    fn scan(&self, prefix: &[u8], opts: ScanOptions) -> Result<Vec<KvPair>> {
        self.inner.scan(prefix, opts)
    }

    fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<u64>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.inner.compare_and_swap(key, expected, value, ttl)
    }

    fn purge_expired(&self) -> Result<usize> {
        self.inner.purge_expired()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
